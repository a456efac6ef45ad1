//! `localtls health` - full health report.

use anyhow::Result;
use std::process::ExitCode;

use localtls::HealthStatus;

use super::Context;
use crate::education::Explain;
use crate::output::{self, emit_structured};

/// Exit code 2 when unhealthy so scripts can gate on it.
pub async fn execute(ctx: Context) -> Result<ExitCode> {
    if ctx.explain {
        Explain::health().print();
    }
    let report = ctx.manager.check().await;
    if !emit_structured(ctx.output_format, &report)? {
        output::print_health(&report);
    }
    Ok(match report.status {
        HealthStatus::Unhealthy => ExitCode::from(2),
        HealthStatus::Healthy | HealthStatus::Degraded => ExitCode::SUCCESS,
    })
}

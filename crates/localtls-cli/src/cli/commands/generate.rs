//! `localtls generate`, `localtls mkcert`, `localtls no-mkcert`.

use anyhow::Result;
use std::process::ExitCode;

use localtls::{ExternalPreference, IssuePolicy};

use super::{ensure, Context};
use crate::education::Explain;
use crate::output::{self, emit_structured};

/// New leaf from the internal CA, regardless of the current one.
pub async fn execute(ctx: Context) -> Result<ExitCode> {
    if ctx.explain {
        Explain::generate().print();
    }
    let config = ctx.manager.config();
    let leaf = ctx
        .manager
        .ensure_leaf(&config.hostnames, config.validity_days, IssuePolicy::force_internal())
        .await?;
    if !emit_structured(ctx.output_format, &leaf)? {
        output::print_leaf(&leaf);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn mkcert(ctx: Context) -> Result<ExitCode> {
    if ctx.explain {
        Explain::mkcert().print();
    }
    let policy = IssuePolicy {
        external: ExternalPreference::Prefer,
        force_new: false,
    };
    ensure::run_flow(&ctx, policy).await
}

pub async fn no_mkcert(ctx: Context) -> Result<ExitCode> {
    if ctx.explain {
        Explain::no_mkcert().print();
    }
    let policy = IssuePolicy {
        external: ExternalPreference::Never,
        force_new: false,
    };
    ensure::run_flow(&ctx, policy).await
}

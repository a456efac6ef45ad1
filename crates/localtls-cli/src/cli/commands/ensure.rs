//! `localtls ensure` - the default startup flow.

use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

use localtls::{EnsureReport, IssuePolicy};

use super::Context;
use crate::education::Explain;
use crate::output::{self, emit_structured};

pub async fn execute(ctx: Context) -> Result<ExitCode> {
    if ctx.explain {
        Explain::ensure().print();
    }
    let policy = IssuePolicy::from_config(ctx.manager.config());
    run_flow(&ctx, policy).await
}

/// Ensure under `policy` and print the report. Shared with `mkcert` and `no-mkcert`.
pub(super) async fn run_flow(ctx: &Context, policy: IssuePolicy) -> Result<ExitCode> {
    let report = ctx.manager.ensure_certificates(policy).await?;
    if !emit_structured(ctx.output_format, &report)? {
        print_report(ctx, &report);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(ctx: &Context, report: &EnsureReport) {
    output::print_leaf(&report.leaf);
    println!();
    println!("{}", "Trust stores:".bold());
    output::print_install_results(&report.trust);
    println!();
    println!(
        "{} {}",
        "Certificate health:".bold(),
        output::status_label(report.health.status)
    );
    for issue in &report.health.issues {
        println!("  - {issue}");
    }
    if !report.health.trusted() {
        println!();
        println!(
            "{}",
            "Browsers will warn until the root is trusted. Run `localtls install-ca` as an administrator or see `localtls instructions`."
                .yellow()
        );
    }
    if ctx.verbose {
        println!();
        output::print_health(&report.health);
    }
}

//! `localtls install-ca` - trust the internal root.

use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

use localtls::CaOrigin;

use super::Context;
use crate::education::Explain;
use crate::output::{self, emit_structured};

/// Store failures are reported but the exit code stays 0; nothing was lost.
pub async fn execute(ctx: Context) -> Result<ExitCode> {
    if ctx.explain {
        Explain::install_ca().print();
    }
    let handle = ctx.manager.ensure_ca()?;
    let results = ctx.manager.install_ca().await?;

    if !emit_structured(ctx.output_format, &results)? {
        if handle.origin != CaOrigin::Loaded {
            println!("{} {}", "Created internal CA".green().bold(), ctx.manager.store().paths().ca_cert.display());
        }
        output::print_install_results(&results);
        if results.iter().any(|r| !r.success) {
            println!();
            println!(
                "{}",
                "Some stores were not updated. Re-run with administrator rights or follow `localtls instructions`."
                    .yellow()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

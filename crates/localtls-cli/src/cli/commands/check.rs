//! `localtls check` - does the server certificate parse and is it in date.

use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

use super::Context;
use crate::education::Explain;
use crate::output::emit_structured;

pub fn execute(ctx: Context) -> Result<ExitCode> {
    if ctx.explain {
        Explain::check().print();
    }
    match ctx.manager.quick_check() {
        Ok(info) => {
            if !emit_structured(ctx.output_format, &info)? {
                println!(
                    "{} expires {} ({})",
                    "Certificate valid:".green().bold(),
                    info.not_after.format("%Y-%m-%d"),
                    info.san.join(", ")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let body = serde_json::json!({
                "valid": false,
                "error": err.to_string(),
                "hint": err.remediation(),
            });
            if !emit_structured(ctx.output_format, &body)? {
                println!("{} {err}", "Certificate invalid:".red().bold());
                println!("{} {}", "hint:".yellow().bold(), err.remediation());
            }
            Ok(ExitCode::from(2))
        }
    }
}

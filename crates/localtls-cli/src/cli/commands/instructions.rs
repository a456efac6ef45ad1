//! `localtls instructions` - manual trust steps.

use anyhow::Result;
use std::process::ExitCode;

use super::Context;
use crate::cli::args::InstructionsArgs;
use crate::education::Explain;
use crate::output::emit_structured;

pub fn execute(ctx: Context, args: InstructionsArgs) -> Result<ExitCode> {
    if ctx.explain {
        Explain::instructions().print();
    }
    let text = ctx.manager.instructions(args.all)?;
    if !emit_structured(ctx.output_format, &serde_json::json!({ "instructions": text }))? {
        println!("{text}");
    }
    Ok(ExitCode::SUCCESS)
}

//! `localtls bundle` - export trust material for other devices.

use anyhow::Result;
use std::process::ExitCode;

use super::Context;
use crate::cli::args::BundleArgs;
use crate::education::Explain;
use crate::output::{self, emit_structured};

pub fn execute(ctx: Context, args: BundleArgs) -> Result<ExitCode> {
    if ctx.explain {
        Explain::bundle().print();
    }
    let manifest = ctx.manager.export_bundle(args.output_dir.as_deref())?;
    if !emit_structured(ctx.output_format, &manifest)? {
        output::print_bundle(&manifest);
    }
    Ok(ExitCode::SUCCESS)
}

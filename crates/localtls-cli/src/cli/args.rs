//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Local HTTPS certificates that browsers trust
///
/// Issues a server certificate for localhost (through mkcert when it is
/// installed, otherwise a private CA), installs the root into the system
/// and browser trust stores, and reports certificate health.
/// Use --explain on any command to see what it will touch.
#[derive(Parser, Debug)]
#[command(name = "localtls")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Application root; certificates live in <ROOT>/certs
    #[arg(long, env = "LOCALTLS_ROOT", global = true, default_value = ".")]
    pub root: PathBuf,

    /// Extra hostname or IP for the certificate (repeatable, comma-separated in env)
    #[arg(
        short = 'H',
        long = "hostname",
        env = "LOCALTLS_HOSTNAMES",
        value_delimiter = ',',
        global = true
    )]
    pub hostnames: Vec<String>,

    /// Leaf certificate validity in days
    #[arg(long, global = true)]
    pub days: Option<u32>,

    /// Organization name in certificate subjects
    #[arg(long, global = true)]
    pub organization: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Explain what this command does and which privileged tools it may run
    #[arg(long, global = true)]
    pub explain: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Defaults to `ensure`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Make certificates ready: reuse or issue a leaf, then trust its root
    Ensure,

    /// Force a new leaf from the internal CA
    Generate,

    /// Prefer mkcert, falling back to the internal CA
    Mkcert,

    /// Use the internal CA only
    NoMkcert,

    /// Install the internal root into system and browser trust stores
    InstallCa,

    /// Export the root plus installer scripts for other machines
    Bundle(BundleArgs),

    /// Full health report (exit code 2 when unhealthy)
    Health,

    /// Quick parse and expiry check of the server certificate
    Check,

    /// Print manual trust installation steps
    Instructions(InstructionsArgs),
}

// ============================================================================
// Bundle command
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct BundleArgs {
    /// Output directory (default: <ROOT>/certs/client_bundle)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

// ============================================================================
// Instructions command
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct InstructionsArgs {
    /// Include every platform, not just this one
    #[arg(long)]
    pub all: bool,
}

//! Command implementations.

pub mod bundle;
pub mod check;
pub mod ensure;
pub mod generate;
pub mod health;
pub mod install_ca;
pub mod instructions;

use localtls::CertificateManager;

use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Certificate manager rooted at `--root`
    pub manager: CertificateManager,

    /// Output format
    pub output_format: OutputFormat,

    /// Whether to show explanations
    pub explain: bool,

    /// Verbose output
    pub verbose: bool,
}

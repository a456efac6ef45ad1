//! # localtls-cli
//!
//! Operator commands for the `localtls` certificate subsystem.
//!
//! ## Features
//!
//! - **Certificates**: issue or reuse a server certificate, via mkcert or the internal CA
//! - **Trust**: install the root into system and browser stores
//! - **Diagnostics**: `health` and `check` with meaningful exit codes
//! - **Sharing**: export a client bundle with standalone installer scripts
//! - **Educational mode**: `--explain` describes what a command will touch
//! - **Multiple output formats**: pretty, JSON, YAML

pub mod cli;
pub mod education;
pub mod output;

pub use cli::run;

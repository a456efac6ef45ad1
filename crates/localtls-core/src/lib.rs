//! # localtls-core
//!
//! Core types shared by the `localtls` certificate subsystem and its CLI.
//!
//! Nothing in this crate touches the network, spawns processes, or writes
//! key material. It defines the vocabulary: configuration, the error
//! taxonomy, certificate summaries, trust records and health reports.

pub mod config;
pub mod error;
pub mod types;

pub use config::TlsConfig;
pub use error::{Result, TlsError};
pub use types::*;

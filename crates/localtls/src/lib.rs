//! # localtls
//!
//! Local certificate lifecycle and trust management.
//!
//! Creates a private root CA, issues server certificates for local
//! hostnames, installs the root into OS and browser trust stores, reports
//! drift (expiry, missing hostnames, lost trust) and exports a portable
//! trust bundle for other machines.
//!
//! ## Example
//!
//! ```rust,no_run
//! use localtls::{CertificateManager, IssuePolicy};
//!
//! #[tokio::main]
//! async fn main() -> localtls::Result<()> {
//!     let config = CertificateManager::load_config(".")?;
//!     let manager = CertificateManager::new(".", config);
//!
//!     let report = manager
//!         .ensure_certificates(IssuePolicy::from_config(manager.config()))
//!         .await?;
//!     println!("serving with {}", report.leaf.cert_path.display());
//!     println!("health: {}", report.health.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Layout on disk
//!
//! Everything lives under `<root>/certs/`; see [`CertPaths`].

pub mod authority;
pub mod bundle;
pub mod external;
pub mod hash;
pub mod health;
pub mod inspect;
pub mod instructions;
pub mod issuer;
pub mod manager;
pub mod runner;
pub mod store;
pub mod trust;

pub use authority::{CaHandle, CaOrigin, CertificateAuthority, LeafRequest};
pub use bundle::BundleExporter;
pub use external::{ExternalCertificates, ExternalToolAdapter};
pub use health::HealthMonitor;
pub use issuer::{
    ExternalPreference, IssuePolicy, LeafCertificateIssuer, LeafHandle, LeafOutcome, StepOutcome,
};
pub use manager::{CertificateManager, EnsureReport};
pub use runner::{CommandOutput, CommandRunner, ScriptedRunner, SystemRunner};
pub use store::{CertPaths, FileMode, KeyPairStore};
pub use trust::{Platform, RootCertificate, TrustStoreManager, TrustStrategy};

pub use localtls_core::*;

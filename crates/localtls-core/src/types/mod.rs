//! Shared data types.

mod bundle;
mod cert;
mod health;
mod trust;

pub use bundle::BundleManifest;
pub use cert::{CertFingerprint, CertificateInfo, CertificateKind, CertificateSource, GenerationState};
pub use health::{HealthReport, HealthStatus, LeafHealth};
pub use trust::{InstallResult, StoreKind, TrustRecord};

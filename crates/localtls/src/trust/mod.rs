//! Trust store integration.
//!
//! Installs a root certificate into the host's trust stores so browsers and
//! HTTP clients accept locally issued certificates without warnings.
//!
//! Platform support:
//! - **Linux**: anchor file in the distribution's CA directory plus the
//!   trust rebuild command (`update-ca-certificates`, `update-ca-trust`, ...)
//! - **Windows**: `certutil -addstore Root`, degrading to the current-user store
//! - **macOS**: `security add-trusted-cert` into the System keychain,
//!   degrading to the login keychain
//! - **NSS** (Firefox profiles, `~/.pki/nssdb`): `certutil -A` per database
//!
//! Every strategy is idempotent: a root already present is left alone, and
//! a stale entry under the same name is replaced rather than duplicated.
//! Failures are reported as [`InstallResult`]s, never as errors; the server
//! can always start with an untrusted certificate.

mod linux;
mod macos;
mod nss;
mod windows;

pub use linux::{LinuxLayout, LinuxTrustStore, LINUX_LAYOUTS};
pub use macos::MacosTrustStore;
pub use nss::NssTrustStore;
pub use windows::WindowsTrustStore;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::inspect;
use crate::runner::CommandRunner;
use localtls_core::{CertificateInfo, InstallResult, Result, StoreKind, TrustRecord};

/// Host platform, probed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux distributions
    Linux,
    /// macOS
    MacOs,
    /// Windows
    Windows,
    /// Anything else; no OS store integration
    Unsupported,
}

impl Platform {
    /// Platform this binary is running on.
    #[must_use]
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            _ => Self::Unsupported,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::MacOs => write!(f, "macos"),
            Self::Windows => write!(f, "windows"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// A root certificate to be trusted.
#[derive(Debug, Clone)]
pub struct RootCertificate {
    /// PEM file on disk, passed to platform tools
    pub path: PathBuf,
    /// PEM bytes
    pub pem: Vec<u8>,
    /// Parsed summary (fingerprints used for lookups)
    pub info: CertificateInfo,
    /// Display name used as NSS nickname and anchor file stem
    pub name: String,
}

impl RootCertificate {
    /// Load a root from a PEM file.
    pub fn from_file(path: &Path, name: impl Into<String>) -> Result<Self> {
        let pem = std::fs::read(path).map_err(|e| localtls_core::TlsError::fs(path, e))?;
        let parsed = inspect::parse_pem(&pem, path)?;
        Ok(Self {
            path: path.to_path_buf(),
            pem,
            info: parsed.info,
            name: name.into(),
        })
    }

    /// SHA-256 fingerprint, lowercase hex.
    pub fn fingerprint(&self) -> &str {
        &self.info.fingerprint
    }

    /// File-system friendly form of the name.
    #[must_use]
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_matches('-');
        if slug.is_empty() {
            "localtls-ca".to_string()
        } else {
            slug.to_string()
        }
    }
}

/// One trust store mechanism.
#[async_trait]
pub trait TrustStrategy: Send + Sync {
    /// Short name used in records and logs.
    fn name(&self) -> &'static str;

    /// Scope of the primary store.
    fn kind(&self) -> StoreKind;

    /// Whether this store exists on the host.
    async fn applicable(&self) -> bool {
        true
    }

    /// Look up the root in every store instance this strategy manages.
    async fn records(&self, root: &RootCertificate) -> Vec<TrustRecord>;

    /// Install the root; idempotent.
    async fn install(&self, root: &RootCertificate) -> InstallResult;

    /// True if any managed store instance holds the root.
    async fn is_installed(&self, root: &RootCertificate) -> bool {
        self.records(root).await.iter().any(|r| r.installed)
    }
}

/// Runs the strategies selected for the host.
pub struct TrustStoreManager {
    strategies: Vec<Box<dyn TrustStrategy>>,
}

impl std::fmt::Debug for TrustStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStoreManager")
            .field("strategies", &self.names())
            .finish()
    }
}

impl TrustStoreManager {
    /// Manager over explicit strategies.
    pub fn new(strategies: Vec<Box<dyn TrustStrategy>>) -> Self {
        Self { strategies }
    }

    /// Strategies for `platform`: the OS store first, then browser stores.
    pub fn for_platform(
        platform: Platform,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
    ) -> Self {
        let mut strategies: Vec<Box<dyn TrustStrategy>> = Vec::new();
        match platform {
            Platform::Linux => {
                strategies.push(Box::new(LinuxTrustStore::detect(runner.clone(), timeout)));
            }
            Platform::MacOs => {
                strategies.push(Box::new(MacosTrustStore::new(runner.clone(), timeout)));
            }
            Platform::Windows => {
                strategies.push(Box::new(WindowsTrustStore::new(runner.clone(), timeout)));
            }
            Platform::Unsupported => {}
        }
        // Windows ships its own `certutil`, which is not the NSS tool.
        if platform != Platform::Windows {
            strategies.push(Box::new(NssTrustStore::for_platform(platform, runner, timeout)));
        }
        Self::new(strategies)
    }

    /// Strategies for the running host.
    pub fn for_host(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self::for_platform(Platform::current(), runner, timeout)
    }

    /// Strategy names, in evaluation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Install into every applicable store.
    pub async fn install(&self, root: &RootCertificate) -> Vec<InstallResult> {
        let mut results = Vec::new();
        for strategy in &self.strategies {
            if !strategy.applicable().await {
                info!(store = strategy.name(), "trust store not present, skipping");
                continue;
            }
            let result = strategy.install(root).await;
            if result.success {
                info!(
                    store = %result.store,
                    scope = %result.kind,
                    already_present = result.already_present,
                    fingerprint = %root.fingerprint(),
                    "root certificate trusted"
                );
            } else {
                warn!(
                    store = %result.store,
                    reason = result.reason.as_deref().unwrap_or("unknown"),
                    "root certificate not trusted"
                );
            }
            results.push(result);
        }
        results
    }

    /// True if an operating-system store holds the root.
    ///
    /// Browser-private stores are reported by [`records`](Self::records)
    /// but do not count here; they only cover a single application.
    pub async fn is_installed(&self, root: &RootCertificate) -> bool {
        for strategy in &self.strategies {
            if !strategy.kind().is_os_store() || !strategy.applicable().await {
                continue;
            }
            if strategy.is_installed(root).await {
                return true;
            }
        }
        false
    }

    /// Trust records from every applicable store.
    pub async fn records(&self, root: &RootCertificate) -> Vec<TrustRecord> {
        let mut records = Vec::new();
        for strategy in &self.strategies {
            if strategy.applicable().await {
                records.extend(strategy.records(root).await);
            }
        }
        records
    }
}

/// True if every install result succeeded and at least one ran.
#[must_use]
pub fn all_succeeded(results: &[InstallResult]) -> bool {
    !results.is_empty() && results.iter().all(|r| r.success)
}

//! Orchestration: "make sure a trusted certificate is ready".

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::authority::{CaHandle, CertificateAuthority};
use crate::bundle::BundleExporter;
use crate::external::ExternalToolAdapter;
use crate::health::HealthMonitor;
use crate::instructions::{self, InstallContext};
use crate::issuer::{IssuePolicy, LeafCertificateIssuer, LeafHandle};
use crate::runner::{CommandRunner, SystemRunner};
use crate::store::KeyPairStore;
use crate::trust::{Platform, RootCertificate, TrustStoreManager};
use localtls_core::{
    BundleManifest, CertificateInfo, CertificateSource, HealthReport, InstallResult, Result,
    StoreKind, TlsConfig, TlsError,
};

/// Outcome of [`CertificateManager::ensure_certificates`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct EnsureReport {
    /// The leaf now on disk
    pub leaf: LeafHandle,
    /// Trust installation attempts (failures are non-fatal)
    pub trust: Vec<InstallResult>,
    /// Health after the flow
    pub health: HealthReport,
}

/// Entry point tying together CA, issuer, trust stores, health and bundles.
#[derive(Debug, Clone)]
pub struct CertificateManager {
    store: KeyPairStore,
    config: TlsConfig,
    external: Option<ExternalToolAdapter>,
    trust: Arc<TrustStoreManager>,
    platform: Platform,
}

impl CertificateManager {
    /// Manager for the host, running real commands.
    pub fn new(root: impl AsRef<Path>, config: TlsConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let timeout = Duration::from_secs(config.command_timeout_secs);
        let external = ExternalToolAdapter::new(config.external_tool.clone(), runner.clone(), timeout);
        let trust = TrustStoreManager::for_host(runner, timeout);
        Self::with_components(KeyPairStore::at(root), config, Some(external), trust)
    }

    /// Manager over explicit components.
    pub fn with_components(
        store: KeyPairStore,
        config: TlsConfig,
        external: Option<ExternalToolAdapter>,
        trust: TrustStoreManager,
    ) -> Self {
        Self {
            store,
            config,
            external,
            trust: Arc::new(trust),
            platform: Platform::current(),
        }
    }

    /// Load `certs/cert_config.toml` under `root` (defaults if absent).
    pub fn load_config(root: impl AsRef<Path>) -> Result<TlsConfig> {
        TlsConfig::load(&KeyPairStore::at(root).paths().config)
    }

    /// Active configuration.
    pub const fn config(&self) -> &TlsConfig {
        &self.config
    }

    /// Certificate store.
    pub const fn store(&self) -> &KeyPairStore {
        &self.store
    }

    /// Trust store strategies in use.
    pub fn trust_stores(&self) -> &TrustStoreManager {
        &self.trust
    }

    /// Load or create the internal CA.
    pub fn ensure_ca(&self) -> Result<CaHandle> {
        CertificateAuthority::ensure(&self.store, &self.config)
    }

    /// Leaf for `hostnames` under `policy`.
    pub async fn ensure_leaf(
        &self,
        hostnames: &[String],
        validity_days: u32,
        policy: IssuePolicy,
    ) -> Result<LeafHandle> {
        self.issuer()
            .ensure_leaf(hostnames, validity_days, policy)
            .await
    }

    /// The full startup flow: leaf, best-effort trust, health.
    ///
    /// Only failures with no fallback (disk, key generation) are errors.
    #[instrument(skip(self), fields(root = %self.store.paths().dir.display()))]
    pub async fn ensure_certificates(&self, policy: IssuePolicy) -> Result<EnsureReport> {
        let leaf = self
            .ensure_leaf(&self.config.hostnames, self.config.validity_days, policy)
            .await?;

        let trust = match leaf.source {
            CertificateSource::Internal => self.install_ca().await?,
            CertificateSource::External => self.install_external_root(&leaf).await,
        };
        for failure in trust.iter().filter_map(InstallResult::error) {
            warn!(error = %failure, "continuing with an untrusted certificate");
        }

        let health = self.check().await;
        info!(status = %health.status, outcome = ?leaf.outcome, "certificates ready");
        Ok(EnsureReport {
            leaf,
            trust,
            health,
        })
    }

    /// Install the internal CA into every applicable trust store.
    pub async fn install_ca(&self) -> Result<Vec<InstallResult>> {
        let root = self.root_certificate()?;
        Ok(self.trust.install(&root).await)
    }

    /// True if an OS store trusts the internal CA.
    pub async fn is_installed(&self) -> Result<bool> {
        let root = self.root_certificate()?;
        Ok(self.trust.is_installed(&root).await)
    }

    /// Health report.
    pub async fn check(&self) -> HealthReport {
        self.monitor().check().await
    }

    /// Parse and expiry check of the leaf.
    pub fn quick_check(&self) -> Result<CertificateInfo> {
        self.monitor().verify_leaf()
    }

    /// Export the trust bundle, by default into `certs/client_bundle/`.
    pub fn export_bundle(&self, output_dir: Option<&Path>) -> Result<BundleManifest> {
        let dir: PathBuf = output_dir.map_or_else(|| self.store.paths().bundle_dir.clone(), Path::to_path_buf);
        BundleExporter::new(self.store.clone(), self.config.clone()).export(&dir)
    }

    /// Manual install steps, for the host platform unless `all` is set.
    pub fn instructions(&self, all: bool) -> Result<String> {
        let ctx = InstallContext::from_store(&self.store, &self.config)?;
        let platform = (!all && self.platform != Platform::Unsupported).then_some(self.platform);
        Ok(instructions::render_markdown(&ctx, platform))
    }

    /// The internal CA as a trust-store input.
    pub fn root_certificate(&self) -> Result<RootCertificate> {
        let path = &self.store.paths().ca_cert;
        if !path.is_file() {
            return Err(TlsError::NoCertificateAuthority { path: path.clone() });
        }
        RootCertificate::from_file(path, self.config.ca_common_name())
    }

    fn issuer(&self) -> LeafCertificateIssuer {
        LeafCertificateIssuer::new(self.store.clone(), self.config.clone(), self.external.clone())
    }

    fn monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            self.store.clone(),
            self.config.clone(),
            self.trust.clone(),
            self.external.clone(),
        )
    }

    async fn install_external_root(&self, leaf: &LeafHandle) -> Vec<InstallResult> {
        let Some(tool) = &self.external else {
            return Vec::new();
        };
        if let Ok(root) = RootCertificate::from_file(&leaf.root_ca_path, self.config.ca_common_name()) {
            if self.trust.is_installed(&root).await {
                return vec![InstallResult::unchanged(tool.binary(), StoreKind::System)];
            }
        }
        if tool.install_root().await {
            vec![InstallResult::installed(tool.binary(), StoreKind::System)]
        } else {
            vec![InstallResult::failed(
                tool.binary(),
                StoreKind::System,
                format!("`{} -install` failed", tool.binary()),
            )]
        }
    }
}

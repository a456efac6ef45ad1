//! Certificate and trust health.
//!
//! Read-only: nothing here writes files or spawns privileged commands, so
//! `check` is safe to run while another process regenerates certificates.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::external::ExternalToolAdapter;
use crate::inspect;
use crate::store::KeyPairStore;
use crate::trust::{RootCertificate, TrustStoreManager};
use localtls_core::{
    CertificateInfo, CertificateSource, HealthReport, LeafHealth, Result, TlsConfig, TlsError,
};

/// Aggregates tool availability, trust state and leaf validity.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    store: KeyPairStore,
    config: TlsConfig,
    trust: Arc<TrustStoreManager>,
    external: Option<ExternalToolAdapter>,
}

impl HealthMonitor {
    /// Monitor over `store`, looking up trust through `trust`.
    pub const fn new(
        store: KeyPairStore,
        config: TlsConfig,
        trust: Arc<TrustStoreManager>,
        external: Option<ExternalToolAdapter>,
    ) -> Self {
        Self {
            store,
            config,
            trust,
            external,
        }
    }

    /// Collect every fact and classify.
    pub async fn check(&self) -> HealthReport {
        let paths = self.store.paths();
        let now = Utc::now();
        let state = self.store.load_state();
        let source = state.as_ref().map(|s| s.source);
        let external_tool_available = self.external.as_ref().is_some_and(ExternalToolAdapter::is_available);

        let root = self.issuing_root(source).await;
        let root_der = root
            .as_ref()
            .and_then(|r| inspect::parse_pem(&r.pem, &r.path).ok())
            .map(|p| p.der);

        let mut leaf = LeafHealth {
            cert_present: paths.server_cert.is_file(),
            key_present: paths.server_key.is_file(),
            ..LeafHealth::default()
        };
        match inspect::read_certificate(&paths.server_cert) {
            Ok(Some(parsed)) => {
                let info = &parsed.info;
                leaf.valid = info.is_valid_at(now);
                leaf.days_until_expiry = Some(info.days_until_expiry(now));
                leaf.expiring_soon = info.expires_within(self.config.renewal_threshold_days, now);
                leaf.missing_hostnames = info.missing_hostnames(&self.config.required_hostnames());
                leaf.chains_to_root = root_der
                    .as_deref()
                    .map(|der| inspect::verify_issued_by(&parsed.der, der));
                leaf.info = Some(parsed.info);
            }
            Ok(None) => {}
            Err(e) => leaf.parse_error = Some(e.to_string()),
        }

        let trust = match &root {
            Some(root) => self.trust.records(root).await,
            None => Vec::new(),
        };
        let (status, issues) = HealthReport::classify(&leaf, &trust);
        debug!(%status, issues = issues.len(), "health check complete");

        HealthReport {
            status,
            checked_at: now,
            external_tool_available,
            ca_present: paths.ca_cert.is_file(),
            root: root.map(|r| r.info),
            leaf,
            trust,
            last_generated: state.map(|s| s.last_generated),
            source,
            issues,
        }
    }

    /// Parse and date-check the leaf only; no trust lookups.
    ///
    /// An expired leaf is [`TlsError::ExpiredCertificate`]; callers renew on it.
    pub fn verify_leaf(&self) -> Result<CertificateInfo> {
        let path = &self.store.paths().server_cert;
        let Some(parsed) = inspect::read_certificate(path)? else {
            return Err(TlsError::fs(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "server certificate not found"),
            ));
        };
        let now = Utc::now();
        if parsed.info.not_after <= now {
            return Err(TlsError::ExpiredCertificate {
                not_after: parsed.info.not_after,
            });
        }
        if parsed.info.not_before > now {
            return Err(TlsError::corrupt(
                path,
                format!("not valid before {}", parsed.info.not_before),
            ));
        }
        Ok(parsed.info)
    }

    /// Root the current leaf is expected to chain to.
    async fn issuing_root(&self, source: Option<CertificateSource>) -> Option<RootCertificate> {
        let path: PathBuf = match (source, &self.external) {
            (Some(CertificateSource::External), Some(tool)) if tool.is_available() => {
                tool.root_ca_path().await.ok()?
            }
            _ => self.store.paths().ca_cert.clone(),
        };
        if !path.is_file() {
            return None;
        }
        match RootCertificate::from_file(&path, self.config.ca_common_name()) {
            Ok(root) => Some(root),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "issuing root unreadable");
                None
            }
        }
    }
}

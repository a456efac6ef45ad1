//! Leaf certificate issuance.
//!
//! [`LeafCertificateIssuer::ensure_leaf`] walks a two-step chain: the
//! external pre-trusted tool first (when preferred), then the internal CA.
//! Each step reports a [`StepOutcome`]; only errors with no remaining
//! fallback propagate.

use chrono::Utc;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::authority::{CaHandle, CaOrigin, CertificateAuthority, LeafRequest};
use crate::external::ExternalToolAdapter;
use crate::inspect::{self, ParsedCertificate};
use crate::store::KeyPairStore;
use localtls_core::config::{merge_hostnames, MAX_LEAF_VALIDITY_DAYS};
use localtls_core::{CertificateInfo, CertificateSource, GenerationState, Result, TlsConfig, TlsError};

/// Result of one step in the issuance chain.
#[derive(Debug)]
pub enum StepOutcome<T> {
    /// The step produced a result; stop here
    Done(T),
    /// The step does not apply (tool absent, not preferred)
    NotApplicable(String),
    /// The step was attempted and failed; try the next one
    Failed(TlsError),
}

/// Whether the external tool may issue the leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalPreference {
    /// Use the tool when it is on `PATH`
    Prefer,
    /// Internal CA only
    Never,
}

/// Knobs for one [`LeafCertificateIssuer::ensure_leaf`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuePolicy {
    /// External tool preference
    pub external: ExternalPreference,
    /// Skip the reuse check and always issue
    pub force_new: bool,
}

impl IssuePolicy {
    /// Policy derived from configuration, reusing valid leaves.
    #[must_use]
    pub const fn from_config(config: &TlsConfig) -> Self {
        Self {
            external: if config.prefer_external_tool {
                ExternalPreference::Prefer
            } else {
                ExternalPreference::Never
            },
            force_new: false,
        }
    }

    /// Always issue a fresh leaf from the internal CA.
    #[must_use]
    pub const fn force_internal() -> Self {
        Self {
            external: ExternalPreference::Never,
            force_new: true,
        }
    }
}

/// What `ensure_leaf` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafOutcome {
    /// Existing leaf was still good
    Reused,
    /// Internal CA signed a new leaf
    Issued,
    /// External tool produced a new leaf
    Delegated,
}

/// The server certificate and key ready to use.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LeafHandle {
    /// `certs/server.crt`
    pub cert_path: PathBuf,
    /// `certs/server.key`
    pub key_path: PathBuf,
    /// Root the leaf chains to
    pub root_ca_path: PathBuf,
    /// Parsed leaf
    pub info: CertificateInfo,
    /// Which path issued it
    pub source: CertificateSource,
    /// What this call did
    pub outcome: LeafOutcome,
    /// Set when the internal CA had to be created or replaced
    #[serde(skip)]
    pub ca_origin: Option<CaOrigin>,
}

/// Produces hostname-bound server certificates.
#[derive(Debug, Clone)]
pub struct LeafCertificateIssuer {
    store: KeyPairStore,
    config: TlsConfig,
    external: Option<ExternalToolAdapter>,
}

impl LeafCertificateIssuer {
    /// Issuer writing into `store`, optionally delegating to `external`.
    pub const fn new(
        store: KeyPairStore,
        config: TlsConfig,
        external: Option<ExternalToolAdapter>,
    ) -> Self {
        Self {
            store,
            config,
            external,
        }
    }

    /// Return a leaf covering `hostnames` plus the loopback names.
    pub async fn ensure_leaf(
        &self,
        hostnames: &[String],
        validity_days: u32,
        policy: IssuePolicy,
    ) -> Result<LeafHandle> {
        if validity_days == 0 || validity_days > MAX_LEAF_VALIDITY_DAYS {
            return Err(TlsError::Config(format!(
                "validity must be between 1 and {MAX_LEAF_VALIDITY_DAYS} days, got {validity_days}"
            )));
        }
        let required = merge_hostnames(hostnames);

        if policy.external == ExternalPreference::Prefer {
            match self.external_step(&required, policy.force_new).await? {
                StepOutcome::Done(handle) => return Ok(handle),
                StepOutcome::NotApplicable(reason) => {
                    debug!(%reason, "external tool step skipped");
                }
                StepOutcome::Failed(err) => {
                    warn!(error = %err, "external tool failed, falling back to internal CA");
                }
            }
        }

        match self.internal_step(&required, validity_days, policy.force_new)? {
            StepOutcome::Done(handle) => Ok(handle),
            StepOutcome::NotApplicable(reason) => Err(TlsError::CertificateGeneration(reason)),
            StepOutcome::Failed(err) => Err(err),
        }
    }

    async fn external_step(
        &self,
        required: &[String],
        force_new: bool,
    ) -> Result<StepOutcome<LeafHandle>> {
        let Some(tool) = &self.external else {
            return Ok(StepOutcome::NotApplicable("no external tool configured".into()));
        };
        if !tool.is_available() {
            return Ok(StepOutcome::NotApplicable(format!(
                "{} not found on PATH",
                tool.binary()
            )));
        }

        if !force_new {
            if let Some(parsed) = self.reusable_leaf(CertificateSource::External, required) {
                let root_ca_path = match tool.root_ca_path().await {
                    Ok(path) => path,
                    Err(e) if e.is_fallback_trigger() => return Ok(StepOutcome::Failed(e)),
                    Err(e) => return Err(e),
                };
                debug!(fingerprint = %parsed.info.fingerprint, "reusing externally issued leaf");
                return Ok(StepOutcome::Done(self.handle(
                    parsed.info,
                    root_ca_path,
                    CertificateSource::External,
                    LeafOutcome::Reused,
                    None,
                )));
            }
        }

        let produced = match tool.generate(required, &self.store).await {
            Ok(produced) => produced,
            Err(e) if e.is_fallback_trigger() => return Ok(StepOutcome::Failed(e)),
            Err(e) => return Err(e),
        };
        let Some(parsed) = inspect::read_certificate(&produced.cert_path)? else {
            return Ok(StepOutcome::Failed(TlsError::tool(
                tool.binary(),
                "certificate vanished after generation",
            )));
        };
        self.record_generation(CertificateSource::External, required)?;
        Ok(StepOutcome::Done(self.handle(
            parsed.info,
            produced.root_ca_path,
            CertificateSource::External,
            LeafOutcome::Delegated,
            None,
        )))
    }

    fn internal_step(
        &self,
        required: &[String],
        validity_days: u32,
        force_new: bool,
    ) -> Result<StepOutcome<LeafHandle>> {
        let paths = self.store.paths();
        if !force_new {
            if let Some(parsed) = self.reusable_leaf(CertificateSource::Internal, required) {
                debug!(fingerprint = %parsed.info.fingerprint, "reusing internally issued leaf");
                return Ok(StepOutcome::Done(self.handle(
                    parsed.info,
                    paths.ca_cert.clone(),
                    CertificateSource::Internal,
                    LeafOutcome::Reused,
                    None,
                )));
            }
        }

        // Re-read the CA right before signing; never sign with a cached root.
        let CaHandle { ca, origin } = CertificateAuthority::ensure(&self.store, &self.config)?;
        let request = LeafRequest::new(&self.config, required.to_vec(), validity_days);
        let issued = ca.sign_leaf(&request)?;
        self.store.write_pair(
            &paths.server_cert,
            &issued.cert_pem,
            &paths.server_key,
            &issued.key_pem,
        )?;
        self.record_generation(CertificateSource::Internal, required)?;

        let mut info = issued.info;
        info.path = paths.server_cert.display().to_string();
        info!(
            cert = %paths.server_cert.display(),
            fingerprint = %info.fingerprint,
            not_after = %info.not_after,
            hostnames = ?required,
            "issued leaf certificate"
        );
        Ok(StepOutcome::Done(self.handle(
            info,
            paths.ca_cert.clone(),
            CertificateSource::Internal,
            LeafOutcome::Issued,
            Some(origin),
        )))
    }

    /// The on-disk leaf, if it can be served as-is for `required`.
    ///
    /// Reuse requires: both files present, inside the validity window and
    /// outside the renewal threshold, SAN superset of `required`, issued by
    /// the path now being asked, and (for internal leaves) signed by the
    /// current root.
    fn reusable_leaf(&self, source: CertificateSource, required: &[String]) -> Option<ParsedCertificate> {
        let paths = self.store.paths();
        if !paths.server_key.is_file() {
            return None;
        }
        let parsed = match inspect::read_certificate(&paths.server_cert) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, "existing leaf unreadable, will replace");
                return None;
            }
        };

        let recorded = self
            .store
            .load_state()
            .map_or(CertificateSource::Internal, |s| s.source);
        if recorded != source {
            debug!(%recorded, wanted = %source, "existing leaf came from the other issuer");
            return None;
        }

        let now = Utc::now();
        let info = &parsed.info;
        if !info.is_valid_at(now) {
            debug!(not_after = %info.not_after, "existing leaf is outside its validity window");
            return None;
        }
        if info.expires_within(self.config.renewal_threshold_days, now) {
            debug!(not_after = %info.not_after, "existing leaf is inside the renewal threshold");
            return None;
        }
        let missing = info.missing_hostnames(required);
        if !missing.is_empty() {
            debug!(?missing, "existing leaf does not cover requested hostnames");
            return None;
        }

        if source == CertificateSource::Internal {
            let chains = matches!(
                CertificateAuthority::load(&self.store),
                Ok(Some(ca)) if ca.issued(&parsed.der)
            );
            if !chains {
                debug!("existing leaf was not signed by the current root");
                return None;
            }
        }
        Some(parsed)
    }

    fn record_generation(&self, source: CertificateSource, hostnames: &[String]) -> Result<()> {
        self.store.save_state(&GenerationState {
            last_generated: Utc::now(),
            source,
            hostnames: hostnames.to_vec(),
        })
    }

    fn handle(
        &self,
        info: CertificateInfo,
        root_ca_path: PathBuf,
        source: CertificateSource,
        outcome: LeafOutcome,
        ca_origin: Option<CaOrigin>,
    ) -> LeafHandle {
        let paths = self.store.paths();
        LeafHandle {
            cert_path: paths.server_cert.clone(),
            key_path: paths.server_key.clone(),
            root_ca_path,
            info,
            source,
            outcome,
            ca_origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandRunner, ScriptedRunner};
    use chrono::Duration;
    use std::sync::Arc;

    fn issuer(dir: &std::path::Path) -> LeafCertificateIssuer {
        LeafCertificateIssuer::new(KeyPairStore::at(dir), TlsConfig::default(), None)
    }

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn internal() -> IssuePolicy {
        IssuePolicy {
            external: ExternalPreference::Never,
            force_new: false,
        }
    }

    /// Overwrite the leaf with one valid in `[now + from, now + to)`.
    fn plant_leaf(dir: &std::path::Path, from: Duration, to: Duration) {
        let store = KeyPairStore::at(dir);
        let ca = CertificateAuthority::load(&store).unwrap().unwrap();
        let mut request = LeafRequest::new(&TlsConfig::default(), merge_hostnames::<&str>(&[]), 1);
        let now = Utc::now();
        request.not_before = now + from;
        request.not_after = now + to;
        let leaf = ca.sign_leaf(&request).unwrap();
        let paths = store.paths();
        store
            .write_pair(&paths.server_cert, &leaf.cert_pem, &paths.server_key, &leaf.key_pem)
            .unwrap();
    }

    #[tokio::test]
    async fn san_is_requested_hosts_plus_loopback() {
        let dir = tempfile::tempdir().unwrap();
        let handle = issuer(dir.path())
            .ensure_leaf(&hosts(&["app.test", "LOCALHOST", "10.0.0.5"]), 365, internal())
            .await
            .unwrap();

        let mut san = handle.info.san.clone();
        san.sort();
        let mut expected = hosts(&["localhost", "127.0.0.1", "::1", "app.test", "10.0.0.5"]);
        expected.sort();
        assert_eq!(san, expected);
        assert_eq!(handle.outcome, LeafOutcome::Issued);
        assert_eq!(handle.ca_origin, Some(CaOrigin::Generated));
        assert!(handle.cert_path.is_file() && handle.key_path.is_file());
    }

    #[tokio::test]
    async fn validity_spans_requested_days() {
        let dir = tempfile::tempdir().unwrap();
        let handle = issuer(dir.path())
            .ensure_leaf(&hosts(&["localhost"]), 90, internal())
            .await
            .unwrap();
        let span = handle.info.not_after - handle.info.not_before;
        assert!((span - Duration::days(90)).num_seconds().abs() <= 1);
    }

    #[tokio::test]
    async fn second_call_reuses_fresh_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(dir.path());
        let first = issuer.ensure_leaf(&hosts(&["localhost"]), 365, internal()).await.unwrap();
        let second = issuer.ensure_leaf(&hosts(&["localhost"]), 365, internal()).await.unwrap();

        assert_eq!(second.outcome, LeafOutcome::Reused);
        assert_eq!(first.info.fingerprint, second.info.fingerprint);
    }

    #[tokio::test]
    async fn expired_leaf_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(dir.path());
        issuer.ensure_leaf(&hosts(&["localhost"]), 365, internal()).await.unwrap();
        plant_leaf(dir.path(), Duration::days(-30), Duration::days(-1));

        let handle = issuer.ensure_leaf(&hosts(&["localhost"]), 365, internal()).await.unwrap();
        assert_eq!(handle.outcome, LeafOutcome::Issued);
        assert!(handle.info.is_valid_at(Utc::now()));
    }

    #[tokio::test]
    async fn leaf_inside_renewal_threshold_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(dir.path());
        issuer.ensure_leaf(&hosts(&["localhost"]), 365, internal()).await.unwrap();
        plant_leaf(dir.path(), Duration::days(-1), Duration::days(3));

        let handle = issuer.ensure_leaf(&hosts(&["localhost"]), 365, internal()).await.unwrap();
        assert_eq!(handle.outcome, LeafOutcome::Issued);
    }

    #[tokio::test]
    async fn new_hostname_forces_reissue() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(dir.path());
        issuer.ensure_leaf(&hosts(&["localhost"]), 365, internal()).await.unwrap();

        let handle = issuer.ensure_leaf(&hosts(&["app.test"]), 365, internal()).await.unwrap();
        assert_eq!(handle.outcome, LeafOutcome::Issued);
        assert!(handle.info.covers(&["app.test", "localhost"]));
    }

    #[tokio::test]
    async fn leaf_from_replaced_root_is_reissued() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(dir.path());
        issuer.ensure_leaf(&hosts(&["localhost"]), 365, internal()).await.unwrap();
        std::fs::write(KeyPairStore::at(dir.path()).paths().ca_cert.clone(), b"").unwrap();

        let handle = issuer.ensure_leaf(&hosts(&["localhost"]), 365, internal()).await.unwrap();
        assert_eq!(handle.outcome, LeafOutcome::Issued);
        assert_eq!(handle.ca_origin, Some(CaOrigin::Regenerated));
        let ca = CertificateAuthority::load(&KeyPairStore::at(dir.path())).unwrap().unwrap();
        let leaf = inspect::read_certificate(&handle.cert_path).unwrap().unwrap();
        assert!(ca.issued(&leaf.der));
    }

    #[tokio::test]
    async fn force_new_always_issues() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(dir.path());
        let first = issuer.ensure_leaf(&hosts(&[]), 365, internal()).await.unwrap();
        let second = issuer
            .ensure_leaf(&hosts(&[]), 365, IssuePolicy::force_internal())
            .await
            .unwrap();
        assert_eq!(second.outcome, LeafOutcome::Issued);
        assert_ne!(first.info.fingerprint, second.info.fingerprint);
    }

    #[tokio::test]
    async fn missing_external_tool_falls_back_to_internal() {
        let dir = tempfile::tempdir().unwrap();
        let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedRunner::succeeding());
        let tool = ExternalToolAdapter::new("localtls-missing-tool", runner, std::time::Duration::from_secs(5));
        let issuer =
            LeafCertificateIssuer::new(KeyPairStore::at(dir.path()), TlsConfig::default(), Some(tool));

        let handle = issuer
            .ensure_leaf(&hosts(&["localhost"]), 365, IssuePolicy::from_config(&TlsConfig::default()))
            .await
            .unwrap();
        assert_eq!(handle.source, CertificateSource::Internal);
        assert_eq!(
            KeyPairStore::at(dir.path()).load_state().unwrap().source,
            CertificateSource::Internal
        );
    }

    #[tokio::test]
    async fn zero_day_validity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = issuer(dir.path())
            .ensure_leaf(&hosts(&["localhost"]), 0, internal())
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::Config(_)));
    }

    #[tokio::test]
    async fn validity_above_browser_ceiling_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(dir.path());
        let err = issuer
            .ensure_leaf(&hosts(&["localhost"]), MAX_LEAF_VALIDITY_DAYS + 1, internal())
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::Config(_)));
        assert!(!dir.path().join("certs").join("server.crt").exists());

        let leaf = issuer
            .ensure_leaf(&hosts(&["localhost"]), MAX_LEAF_VALIDITY_DAYS, internal())
            .await
            .unwrap();
        assert_eq!(leaf.outcome, LeafOutcome::Issued);
    }
}

//! End-to-end certificate lifecycle against a temp-dir trust store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use localtls::trust::LinuxTrustStore;
use localtls::{
    CertificateAuthority, CertificateManager, CertificateSource, CommandOutput, ExternalPreference,
    ExternalToolAdapter, HealthStatus, IssuePolicy, KeyPairStore, LeafOutcome, LeafRequest,
    ScriptedRunner, TlsConfig, TlsError, TrustStoreManager,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn anchors_trust(dir: &Path) -> TrustStoreManager {
    let anchors = dir.join("anchors");
    std::fs::create_dir_all(&anchors).unwrap();
    let linux = LinuxTrustStore::with_layout(
        anchors,
        vec!["update-ca-certificates".into()],
        Vec::new(),
        Arc::new(ScriptedRunner::succeeding()),
        TIMEOUT,
    );
    TrustStoreManager::new(vec![Box::new(linux)])
}

fn internal_only() -> IssuePolicy {
    IssuePolicy {
        external: ExternalPreference::Never,
        force_new: false,
    }
}

/// A stand-in for mkcert: its own CA under `caroot/`, leaves signed by it.
struct FakeTool {
    binary: PathBuf,
    caroot: PathBuf,
    runner: Arc<ScriptedRunner>,
}

fn fake_tool(dir: &Path, fail_generate: bool) -> FakeTool {
    let binary = dir.join("bin").join("mkcert");
    std::fs::create_dir_all(binary.parent().unwrap()).unwrap();
    std::fs::write(&binary, b"").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let tool_store = KeyPairStore::at(dir.join("tool"));
    let config = TlsConfig::default();
    let ca = CertificateAuthority::ensure(&tool_store, &config).unwrap().ca;
    let caroot = dir.join("caroot");
    std::fs::create_dir_all(&caroot).unwrap();
    std::fs::copy(&tool_store.paths().ca_cert, caroot.join("rootCA.pem")).unwrap();

    let leaf = ca
        .sign_leaf(&LeafRequest::new(&config, config.required_hostnames(), 365))
        .unwrap();
    let caroot_out = caroot.display().to_string();

    let runner = Arc::new(ScriptedRunner::new(move |inv| {
        match inv.args.first().map(String::as_str) {
            Some("-CAROOT") => Ok(CommandOutput::ok(format!("{caroot_out}\n"))),
            Some("-install") => Ok(CommandOutput::ok("")),
            Some("-cert-file") if fail_generate => Ok(CommandOutput::failed(1, "ERROR: boom")),
            Some("-cert-file") => {
                std::fs::write(&inv.args[1], &leaf.cert_pem).unwrap();
                std::fs::write(&inv.args[3], &leaf.key_pem).unwrap();
                Ok(CommandOutput::ok(""))
            }
            _ => Ok(CommandOutput::failed(2, "unexpected arguments")),
        }
    }));

    FakeTool {
        binary,
        caroot,
        runner,
    }
}

fn manager_with_tool(dir: &Path, tool: &FakeTool) -> CertificateManager {
    let adapter = ExternalToolAdapter::new(
        tool.binary.display().to_string(),
        tool.runner.clone(),
        TIMEOUT,
    );
    CertificateManager::with_components(
        KeyPairStore::at(dir),
        TlsConfig::default(),
        Some(adapter),
        anchors_trust(dir),
    )
}

#[tokio::test]
async fn fresh_install_issue_trust_and_check() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CertificateManager::with_components(
        KeyPairStore::at(dir.path()),
        TlsConfig::default(),
        None,
        anchors_trust(dir.path()),
    );

    let leaf = manager
        .ensure_leaf(&["localhost".to_string()], 365, internal_only())
        .await
        .unwrap();
    assert_eq!(leaf.source, CertificateSource::Internal);
    for host in ["localhost", "127.0.0.1", "::1"] {
        assert!(leaf.info.san.iter().any(|s| s == host), "missing {host}");
    }

    assert!(!manager.is_installed().await.unwrap());
    let results = manager.install_ca().await.unwrap();
    assert!(results.iter().all(|r| r.success && !r.already_present));
    assert!(manager.is_installed().await.unwrap());

    let again = manager.install_ca().await.unwrap();
    assert!(again.iter().all(|r| r.already_present));

    let report = manager.check().await;
    assert_eq!(report.status, HealthStatus::Healthy, "{:?}", report.issues);
    assert!(manager.quick_check().is_ok());
}

#[tokio::test]
async fn bundle_requires_a_ca_then_matches_it() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CertificateManager::with_components(
        KeyPairStore::at(dir.path()),
        TlsConfig::default(),
        None,
        anchors_trust(dir.path()),
    );
    let target = dir.path().join("bundle");

    assert!(matches!(
        manager.export_bundle(Some(&target)),
        Err(TlsError::NoCertificateAuthority { .. })
    ));
    assert!(!target.exists());

    manager.ensure_ca().unwrap();
    let manifest = manager.export_bundle(Some(&target)).unwrap();
    assert_eq!(
        std::fs::read(&manifest.ca_certificate).unwrap(),
        std::fs::read(&manager.store().paths().ca_cert).unwrap()
    );
    assert!(!std::fs::read_to_string(&manifest.ca_certificate)
        .unwrap()
        .contains("PRIVATE KEY"));
}

#[tokio::test]
async fn external_tool_is_preferred_and_reused() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), false);
    let manager = manager_with_tool(dir.path(), &tool);
    let prefer = IssuePolicy::from_config(manager.config());

    let first = manager.ensure_certificates(prefer).await.unwrap();
    assert_eq!(first.leaf.source, CertificateSource::External);
    assert_eq!(first.leaf.outcome, LeafOutcome::Delegated);
    assert_eq!(first.leaf.root_ca_path, tool.caroot.join("rootCA.pem"));
    assert!(first.trust.iter().all(|r| r.success));
    assert_eq!(first.health.leaf.chains_to_root, Some(true));
    assert!(
        !manager.store().paths().ca_cert.exists(),
        "internal CA must not be created when the tool succeeds"
    );

    let second = manager.ensure_certificates(prefer).await.unwrap();
    assert_eq!(second.leaf.outcome, LeafOutcome::Reused);
    assert_eq!(second.leaf.info.fingerprint, first.leaf.info.fingerprint);
}

#[tokio::test]
async fn failing_tool_falls_back_to_internal_ca() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), true);
    let manager = manager_with_tool(dir.path(), &tool);

    let report = manager
        .ensure_certificates(IssuePolicy::from_config(manager.config()))
        .await
        .unwrap();
    assert_eq!(report.leaf.source, CertificateSource::Internal);
    assert_eq!(report.leaf.outcome, LeafOutcome::Issued);
    assert!(manager.store().paths().ca_cert.is_file());
    assert_eq!(report.health.status, HealthStatus::Healthy, "{:?}", report.health.issues);
    assert!(tool
        .runner
        .command_lines()
        .iter()
        .any(|line| line.contains("-cert-file")));
}

#[tokio::test]
async fn never_policy_skips_the_tool() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), false);
    let manager = manager_with_tool(dir.path(), &tool);

    let report = manager.ensure_certificates(internal_only()).await.unwrap();
    assert_eq!(report.leaf.source, CertificateSource::Internal);
    assert!(tool.runner.calls().is_empty());
}

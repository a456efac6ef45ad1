//! Linux system trust via an anchor file and the distribution's rebuild command.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{RootCertificate, TrustStrategy};
use crate::inspect;
use crate::runner::{describe_failure, CommandRunner};
use crate::store::{write_atomic, FileMode};
use localtls_core::{InstallResult, StoreKind, TlsError, TrustRecord};

const STORE: &str = "linux";

/// Anchor directory and rebuild command of one distribution family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinuxLayout {
    /// Directory scanned by the rebuild command
    pub anchors_dir: &'static str,
    /// Rebuild command and arguments
    pub rebuild: &'static [&'static str],
}

/// Known layouts, probed in order.
pub const LINUX_LAYOUTS: &[LinuxLayout] = &[
    // Debian / Ubuntu / Alpine
    LinuxLayout {
        anchors_dir: "/usr/local/share/ca-certificates",
        rebuild: &["update-ca-certificates"],
    },
    // Fedora / RHEL / CentOS
    LinuxLayout {
        anchors_dir: "/etc/pki/ca-trust/source/anchors",
        rebuild: &["update-ca-trust", "extract"],
    },
    // Arch (p11-kit)
    LinuxLayout {
        anchors_dir: "/etc/ca-certificates/trust-source/anchors",
        rebuild: &["trust", "extract-compat"],
    },
    // openSUSE
    LinuxLayout {
        anchors_dir: "/usr/share/pki/trust/anchors",
        rebuild: &["update-ca-certificates"],
    },
];

/// Anchor-file strategy.
pub struct LinuxTrustStore {
    anchors_dir: PathBuf,
    rebuild: Vec<String>,
    bundles: Vec<PathBuf>,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl LinuxTrustStore {
    /// Pick the first layout whose anchor directory exists, defaulting to Debian.
    pub fn detect(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        let layout = LINUX_LAYOUTS
            .iter()
            .find(|l| Path::new(l.anchors_dir).is_dir())
            .unwrap_or(&LINUX_LAYOUTS[0]);
        debug!(anchors = layout.anchors_dir, "selected linux trust layout");
        Self::with_layout(
            layout.anchors_dir,
            layout.rebuild.iter().map(ToString::to_string).collect(),
            inspect::SYSTEM_BUNDLE_PATHS.iter().map(PathBuf::from).collect(),
            runner,
            timeout,
        )
    }

    /// Explicit layout, e.g. a scratch directory in tests.
    pub fn with_layout(
        anchors_dir: impl Into<PathBuf>,
        rebuild: Vec<String>,
        bundles: Vec<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
    ) -> Self {
        Self {
            anchors_dir: anchors_dir.into(),
            rebuild,
            bundles,
            runner,
            timeout,
        }
    }

    /// Path of the anchor file for `root`.
    pub fn anchor_path(&self, root: &RootCertificate) -> PathBuf {
        self.anchors_dir.join(format!("{}.crt", root.slug()))
    }

    fn anchor_matches(&self, root: &RootCertificate) -> bool {
        inspect::read_certificate(&self.anchor_path(root))
            .ok()
            .flatten()
            .is_some_and(|parsed| parsed.info.fingerprint == root.fingerprint())
    }

    fn in_system_bundle(&self, root: &RootCertificate) -> bool {
        self.bundles
            .iter()
            .any(|bundle| inspect::bundle_fingerprints(bundle).contains(root.fingerprint()))
    }

    /// The extracted bundle is what TLS clients read. Only without one is
    /// the anchor itself the evidence, and then only after a rebuild
    /// succeeded (a failed rebuild removes the anchor again).
    fn trusted(&self, root: &RootCertificate) -> bool {
        if self.bundles.iter().any(|b| b.is_file()) {
            self.in_system_bundle(root)
        } else {
            self.anchor_matches(root)
        }
    }

    fn anchors_writable(&self) -> bool {
        tempfile::tempfile_in(&self.anchors_dir).is_ok()
    }

    async fn remove_anchor(&self, anchor: &Path, privileged: bool) {
        let removed = if privileged {
            let args = vec!["rm".to_string(), "-f".to_string(), anchor.display().to_string()];
            matches!(self.runner.run("sudo", &args, self.timeout).await, Ok(o) if o.success())
        } else {
            std::fs::remove_file(anchor).is_ok()
        };
        if !removed {
            warn!(anchor = %anchor.display(), "could not remove anchor after failed rebuild");
        }
    }

    async fn run_rebuild(&self, privileged: bool) -> Result<(), String> {
        let Some((program, rest)) = self.rebuild.split_first() else {
            return Ok(());
        };
        let (program, args) = if privileged {
            ("sudo", self.rebuild.clone())
        } else {
            (program.as_str(), rest.to_vec())
        };
        match self.runner.run(program, &args, self.timeout).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(format!("{}: {}", self.rebuild.join(" "), describe_failure(&output))),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn privileged_copy(&self, root: &RootCertificate, anchor: &Path) -> Result<(), String> {
        let args = vec![
            "install".to_string(),
            "-m".to_string(),
            "0644".to_string(),
            root.path.display().to_string(),
            anchor.display().to_string(),
        ];
        match self.runner.run("sudo", &args, self.timeout).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(format!("sudo install: {}", describe_failure(&output))),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[async_trait]
impl TrustStrategy for LinuxTrustStore {
    fn name(&self) -> &'static str {
        STORE
    }

    fn kind(&self) -> StoreKind {
        StoreKind::System
    }

    async fn records(&self, root: &RootCertificate) -> Vec<TrustRecord> {
        vec![TrustRecord {
            store: STORE.to_string(),
            kind: StoreKind::System,
            location: Some(self.anchor_path(root).display().to_string()),
            installed: self.trusted(root),
        }]
    }

    async fn install(&self, root: &RootCertificate) -> InstallResult {
        if self.trusted(root) {
            return InstallResult::unchanged(STORE, StoreKind::System);
        }

        let anchor = self.anchor_path(root);
        if self.anchor_matches(root) {
            // Anchor in place but never extracted into the bundle.
            let privileged = !self.anchors_writable();
            debug!(anchor = %anchor.display(), privileged, "anchor present, rebuilding trust bundle");
            return match self.run_rebuild(privileged).await {
                Ok(()) => InstallResult::installed(STORE, StoreKind::System),
                Err(reason) => {
                    warn!(anchor = %anchor.display(), %reason, "trust rebuild failed");
                    InstallResult::failed(STORE, StoreKind::System, reason)
                }
            };
        }

        let privileged = match write_atomic(&anchor, &root.pem, FileMode::Public) {
            Ok(()) => false,
            Err(TlsError::Filesystem { source, .. })
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                debug!(anchor = %anchor.display(), "anchor directory not writable, using sudo");
                if let Err(reason) = self.privileged_copy(root, &anchor).await {
                    return InstallResult::failed(
                        STORE,
                        StoreKind::System,
                        format!("insufficient privilege to write {}: {reason}", anchor.display()),
                    );
                }
                true
            }
            Err(e) => return InstallResult::failed(STORE, StoreKind::System, e.to_string()),
        };

        match self.run_rebuild(privileged).await {
            Ok(()) => InstallResult::installed(STORE, StoreKind::System),
            Err(reason) => {
                warn!(anchor = %anchor.display(), %reason, "trust rebuild failed");
                self.remove_anchor(&anchor, privileged).await;
                InstallResult::failed(STORE, StoreKind::System, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::CertificateAuthority;
    use crate::runner::{CommandOutput, ScriptedRunner};
    use localtls_core::TlsConfig;

    fn root_in(dir: &Path) -> RootCertificate {
        let ca = CertificateAuthority::generate(&TlsConfig::default()).unwrap();
        let path = dir.join("ca.crt");
        std::fs::write(&path, ca.certificate_pem()).unwrap();
        RootCertificate::from_file(&path, "Local Development Local CA").unwrap()
    }

    fn store(anchors: &Path, runner: Arc<ScriptedRunner>) -> LinuxTrustStore {
        LinuxTrustStore::with_layout(
            anchors,
            vec!["update-ca-certificates".into()],
            Vec::new(),
            runner,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn install_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = dir.path().join("anchors");
        std::fs::create_dir_all(&anchors).unwrap();
        let root = root_in(dir.path());
        let runner = Arc::new(ScriptedRunner::succeeding());
        let linux = store(&anchors, runner.clone());

        assert!(!linux.is_installed(&root).await);
        let first = linux.install(&root).await;
        assert!(first.success && !first.already_present);
        let second = linux.install(&root).await;
        assert!(second.success && second.already_present);

        let entries: Vec<_> = std::fs::read_dir(&anchors).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(runner.command_lines(), vec!["update-ca-certificates"]);
        assert!(linux.is_installed(&root).await);
    }

    #[tokio::test]
    async fn replaces_stale_anchor_for_regenerated_root() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = dir.path().join("anchors");
        std::fs::create_dir_all(&anchors).unwrap();
        let runner = Arc::new(ScriptedRunner::succeeding());
        let linux = store(&anchors, runner);

        let old_dir = dir.path().join("old");
        std::fs::create_dir_all(&old_dir).unwrap();
        let old = root_in(&old_dir);
        linux.install(&old).await;

        let new = root_in(dir.path());
        assert!(!linux.is_installed(&new).await);
        assert!(linux.install(&new).await.success);
        assert!(linux.is_installed(&new).await);
        assert!(!linux.is_installed(&old).await);
        assert_eq!(std::fs::read_dir(&anchors).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn rebuild_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = dir.path().join("anchors");
        std::fs::create_dir_all(&anchors).unwrap();
        let root = root_in(dir.path());
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(CommandOutput::failed(1, "boom"))));

        let result = store(&anchors, runner).install(&root).await;
        assert!(!result.success);
        assert!(result.reason.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn failed_rebuild_is_retried_on_next_install() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = dir.path().join("anchors");
        std::fs::create_dir_all(&anchors).unwrap();
        let root = root_in(dir.path());
        let attempts = std::sync::atomic::AtomicUsize::new(0);
        let runner = Arc::new(ScriptedRunner::new(move |_| {
            if attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Ok(CommandOutput::failed(1, "rebuild timed out"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));
        let linux = store(&anchors, runner.clone());

        let first = linux.install(&root).await;
        assert!(!first.success);
        assert!(!linux.is_installed(&root).await);

        let second = linux.install(&root).await;
        assert!(second.success && !second.already_present);
        assert!(linux.is_installed(&root).await);
        assert_eq!(
            runner.command_lines(),
            vec!["update-ca-certificates", "update-ca-certificates"]
        );
    }

    #[tokio::test]
    async fn anchor_missing_from_bundle_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = dir.path().join("anchors");
        std::fs::create_dir_all(&anchors).unwrap();
        let root = root_in(dir.path());
        let bundle = dir.path().join("ca-certificates.crt");
        std::fs::write(&bundle, b"").unwrap();

        let extracted = bundle.clone();
        let pem = root.pem.clone();
        let runner = Arc::new(ScriptedRunner::new(move |_| {
            std::fs::write(&extracted, &pem).unwrap();
            Ok(CommandOutput::ok(""))
        }));
        let linux = LinuxTrustStore::with_layout(
            &anchors,
            vec!["update-ca-certificates".into()],
            vec![bundle],
            runner.clone(),
            Duration::from_secs(5),
        );
        std::fs::write(linux.anchor_path(&root), &root.pem).unwrap();

        assert!(!linux.is_installed(&root).await, "anchor alone is not trust");
        let result = linux.install(&root).await;
        assert!(result.success && !result.already_present);
        assert_eq!(runner.command_lines(), vec!["update-ca-certificates"]);
        assert!(linux.is_installed(&root).await);
    }

    #[tokio::test]
    async fn bundle_membership_counts_as_installed() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_in(dir.path());
        let bundle = dir.path().join("ca-certificates.crt");
        std::fs::write(&bundle, &root.pem).unwrap();
        let runner = Arc::new(ScriptedRunner::succeeding());
        let linux = LinuxTrustStore::with_layout(
            dir.path().join("anchors"),
            vec!["update-ca-certificates".into()],
            vec![bundle],
            runner.clone(),
            Duration::from_secs(5),
        );

        assert!(linux.is_installed(&root).await);
        assert!(linux.install(&root).await.already_present);
        assert!(runner.calls().is_empty());
    }
}

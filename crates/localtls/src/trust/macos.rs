//! macOS keychain trust via `security`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{RootCertificate, TrustStrategy};
use crate::runner::{describe_failure, CommandRunner};
use localtls_core::{InstallResult, StoreKind, TrustRecord};

const STORE: &str = "macos";
const SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";

/// System keychain strategy with a login-keychain fallback.
pub struct MacosTrustStore {
    system_keychain: PathBuf,
    login_keychain: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl MacosTrustStore {
    /// Default keychains for the current user.
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            system_keychain: PathBuf::from(SYSTEM_KEYCHAIN),
            login_keychain: dirs::home_dir()
                .map(|home| home.join("Library/Keychains/login.keychain-db")),
            runner,
            timeout,
        }
    }

    async fn keychain_holds(&self, keychain: &Path, root: &RootCertificate) -> bool {
        let args = vec![
            "find-certificate".to_string(),
            "-a".to_string(),
            "-Z".to_string(),
            keychain.display().to_string(),
        ];
        match self.runner.run("security", &args, self.timeout).await {
            Ok(output) if output.success() => {
                sha256_hashes(&output.stdout).any(|h| h.eq_ignore_ascii_case(root.fingerprint()))
            }
            _ => false,
        }
    }

    async fn add_trusted(&self, keychain: &Path, root: &RootCertificate, privileged: bool) -> Result<(), String> {
        let mut args: Vec<String> = Vec::new();
        let program = if privileged {
            args.push("security".into());
            "sudo"
        } else {
            "security"
        };
        args.push("add-trusted-cert".into());
        if privileged {
            // -d targets the admin trust domain
            args.push("-d".into());
        }
        args.extend([
            "-r".to_string(),
            "trustRoot".to_string(),
            "-k".to_string(),
            keychain.display().to_string(),
            root.path.display().to_string(),
        ]);
        match self.runner.run(program, &args, self.timeout).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(describe_failure(&output)),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// `SHA-256 hash: ABCD...` lines from `security find-certificate -Z`.
fn sha256_hashes(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("SHA-256 hash:"))
        .map(str::trim)
}

#[async_trait]
impl TrustStrategy for MacosTrustStore {
    fn name(&self) -> &'static str {
        STORE
    }

    fn kind(&self) -> StoreKind {
        StoreKind::System
    }

    async fn records(&self, root: &RootCertificate) -> Vec<TrustRecord> {
        let mut records = vec![TrustRecord {
            store: STORE.to_string(),
            kind: StoreKind::System,
            location: Some(self.system_keychain.display().to_string()),
            installed: self.keychain_holds(&self.system_keychain, root).await,
        }];
        if let Some(login) = &self.login_keychain {
            records.push(TrustRecord {
                store: STORE.to_string(),
                kind: StoreKind::User,
                location: Some(login.display().to_string()),
                installed: self.keychain_holds(login, root).await,
            });
        }
        records
    }

    async fn install(&self, root: &RootCertificate) -> InstallResult {
        if let Some(present) = self.records(root).await.into_iter().find(|r| r.installed) {
            return InstallResult::unchanged(STORE, present.kind);
        }

        let system_err = match self.add_trusted(&self.system_keychain, root, true).await {
            Ok(()) => return InstallResult::installed(STORE, StoreKind::System),
            Err(e) => e,
        };

        let Some(login) = &self.login_keychain else {
            return InstallResult::failed(STORE, StoreKind::System, system_err);
        };
        match self.add_trusted(login, root, false).await {
            Ok(()) => InstallResult {
                reason: Some(format!("system keychain refused ({system_err}); trusted for current user only")),
                ..InstallResult::installed(STORE, StoreKind::User)
            },
            Err(user_err) => InstallResult::failed(
                STORE,
                StoreKind::System,
                format!("system keychain: {system_err}; login keychain: {user_err}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, ScriptedRunner};
    use localtls_core::{CertificateInfo, CertificateKind};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn root() -> RootCertificate {
        let now = chrono::Utc::now();
        RootCertificate {
            path: PathBuf::from("/tmp/ca.crt"),
            pem: Vec::new(),
            info: CertificateInfo {
                path: "/tmp/ca.crt".into(),
                fingerprint: "ab".repeat(32),
                thumbprint: "cd".repeat(20),
                subject: String::new(),
                issuer: String::new(),
                serial: String::new(),
                not_before: now,
                not_after: now,
                san: Vec::new(),
                kind: CertificateKind::Authority,
            },
            name: "Local CA".into(),
        }
    }

    fn store(runner: Arc<ScriptedRunner>) -> MacosTrustStore {
        MacosTrustStore {
            system_keychain: PathBuf::from(SYSTEM_KEYCHAIN),
            login_keychain: Some(PathBuf::from("/Users/dev/Library/Keychains/login.keychain-db")),
            runner,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn parses_find_certificate_hashes() {
        let out = "SHA-256 hash: ABAB\nkeychain: \"/Library/Keychains/System.keychain\"\nSHA-1 hash: CDCD\n";
        assert_eq!(sha256_hashes(out).collect::<Vec<_>>(), vec!["ABAB"]);
    }

    #[tokio::test]
    async fn install_then_reinstall_adds_once() {
        let added = Arc::new(AtomicBool::new(false));
        let flag = added.clone();
        let runner = Arc::new(ScriptedRunner::new(move |inv| {
            let line = inv.command_line();
            if line.contains("find-certificate") {
                if flag.load(Ordering::SeqCst) && line.contains("System.keychain") {
                    return Ok(CommandOutput::ok(format!("SHA-256 hash: {}\n", "AB".repeat(32))));
                }
                return Ok(CommandOutput::ok(""));
            }
            if line.starts_with("sudo security add-trusted-cert -d") {
                flag.store(true, Ordering::SeqCst);
                return Ok(CommandOutput::ok(""));
            }
            Ok(CommandOutput::failed(1, "unexpected"))
        }));
        let mac = store(runner.clone());

        let first = mac.install(&root()).await;
        assert!(first.success && !first.already_present);
        let second = mac.install(&root()).await;
        assert!(second.success && second.already_present);

        let adds = runner
            .command_lines()
            .into_iter()
            .filter(|l| l.contains("add-trusted-cert"))
            .count();
        assert_eq!(adds, 1);
    }

    #[tokio::test]
    async fn falls_back_to_login_keychain() {
        let runner = Arc::new(ScriptedRunner::new(|inv| {
            if inv.program == "sudo" {
                Ok(CommandOutput::failed(1, "authorization denied"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));
        let result = store(runner).install(&root()).await;
        assert!(result.success);
        assert_eq!(result.kind, StoreKind::User);
        assert!(result.reason.unwrap().contains("authorization denied"));
    }
}

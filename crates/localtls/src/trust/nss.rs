//! NSS certificate databases (Firefox profiles, Chromium's `~/.pki/nssdb`).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{Platform, RootCertificate, TrustStrategy};
use crate::inspect;
use crate::runner::{describe_failure, which, CommandRunner};
use localtls_core::{InstallResult, StoreKind, TrustRecord};

const STORE: &str = "nss";

/// Browser databases managed with NSS `certutil`.
pub struct NssTrustStore {
    program: String,
    profile_roots: Vec<PathBuf>,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl NssTrustStore {
    /// Well-known database locations for `platform`.
    pub fn for_platform(platform: Platform, runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        let roots = dirs::home_dir()
            .map(|home| default_roots(platform, &home))
            .unwrap_or_default();
        Self::with_roots(roots, runner, timeout)
    }

    /// Explicit profile roots. Each root is either a database directory or
    /// a directory whose children are databases (a Firefox profiles dir).
    pub fn with_roots(
        profile_roots: Vec<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: "certutil".to_string(),
            profile_roots,
            runner,
            timeout,
        }
    }

    /// Database specifiers (`sql:<dir>` or `dbm:<dir>`) found under the roots.
    pub fn databases(&self) -> Vec<String> {
        let mut found = Vec::new();
        for root in &self.profile_roots {
            if let Some(db) = database_spec(root) {
                found.push(db);
                continue;
            }
            let Ok(entries) = std::fs::read_dir(root) else {
                continue;
            };
            let mut children: Vec<PathBuf> = entries
                .filter_map(std::result::Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            children.sort();
            found.extend(children.iter().filter_map(|p| database_spec(p)));
        }
        found
    }

    async fn holds(&self, db: &str, root: &RootCertificate) -> bool {
        let args = vec![
            "-L".to_string(),
            "-d".to_string(),
            db.to_string(),
            "-n".to_string(),
            root.name.clone(),
            "-a".to_string(),
        ];
        match self.runner.run(&self.program, &args, self.timeout).await {
            Ok(output) if output.success() => inspect::parse_pem(output.stdout.as_bytes(), Path::new(db))
                .is_ok_and(|parsed| parsed.info.fingerprint == root.fingerprint()),
            _ => false,
        }
    }

    async fn add(&self, db: &str, root: &RootCertificate) -> Result<(), String> {
        // A stale root under the same nickname would shadow the new one.
        let delete = vec![
            "-D".to_string(),
            "-d".to_string(),
            db.to_string(),
            "-n".to_string(),
            root.name.clone(),
        ];
        if let Ok(output) = self.runner.run(&self.program, &delete, self.timeout).await {
            debug!(db, removed = output.success(), "cleared previous nickname");
        }

        let add = vec![
            "-A".to_string(),
            "-d".to_string(),
            db.to_string(),
            "-t".to_string(),
            "C,,".to_string(),
            "-n".to_string(),
            root.name.clone(),
            "-i".to_string(),
            root.path.display().to_string(),
        ];
        match self.runner.run(&self.program, &add, self.timeout).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(describe_failure(&output)),
            Err(e) => Err(e.to_string()),
        }
    }
}

fn default_roots(platform: Platform, home: &Path) -> Vec<PathBuf> {
    match platform {
        Platform::MacOs => vec![home.join("Library/Application Support/Firefox/Profiles")],
        Platform::Windows => Vec::new(),
        Platform::Linux | Platform::Unsupported => vec![
            home.join(".pki/nssdb"),
            home.join(".mozilla/firefox"),
            home.join("snap/firefox/common/.mozilla/firefox"),
            home.join(".var/app/org.mozilla.firefox/.mozilla/firefox"),
        ],
    }
}

fn database_spec(dir: &Path) -> Option<String> {
    if dir.join("cert9.db").is_file() {
        Some(format!("sql:{}", dir.display()))
    } else if dir.join("cert8.db").is_file() {
        Some(format!("dbm:{}", dir.display()))
    } else {
        None
    }
}

#[async_trait]
impl TrustStrategy for NssTrustStore {
    fn name(&self) -> &'static str {
        STORE
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Browser
    }

    async fn applicable(&self) -> bool {
        which(&self.program).is_some() && !self.databases().is_empty()
    }

    async fn records(&self, root: &RootCertificate) -> Vec<TrustRecord> {
        let mut records = Vec::new();
        for db in self.databases() {
            let installed = self.holds(&db, root).await;
            records.push(TrustRecord {
                store: STORE.to_string(),
                kind: StoreKind::Browser,
                location: Some(db),
                installed,
            });
        }
        records
    }

    async fn install(&self, root: &RootCertificate) -> InstallResult {
        let databases = self.databases();
        if databases.is_empty() {
            return InstallResult::failed(STORE, StoreKind::Browser, "no NSS databases found");
        }

        let mut added = 0usize;
        let mut failures = Vec::new();
        for db in &databases {
            if self.holds(db, root).await {
                continue;
            }
            match self.add(db, root).await {
                Ok(()) => added += 1,
                Err(reason) => failures.push(format!("{db}: {reason}")),
            }
        }

        if !failures.is_empty() {
            InstallResult::failed(STORE, StoreKind::Browser, failures.join("; "))
        } else if added == 0 {
            InstallResult::unchanged(STORE, StoreKind::Browser)
        } else {
            InstallResult::installed(STORE, StoreKind::Browser)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::CertificateAuthority;
    use crate::runner::{CommandOutput, ScriptedRunner};
    use localtls_core::TlsConfig;
    use std::sync::Mutex;

    fn root_in(dir: &Path) -> RootCertificate {
        let ca = CertificateAuthority::generate(&TlsConfig::default()).unwrap();
        let path = dir.join("ca.crt");
        std::fs::write(&path, ca.certificate_pem()).unwrap();
        RootCertificate::from_file(&path, "Local Development Local CA").unwrap()
    }

    fn profiles(dir: &Path) -> PathBuf {
        let profiles = dir.join("firefox");
        for (name, file) in [("a.default", "cert9.db"), ("b.legacy", "cert8.db"), ("c.empty", "")] {
            let p = profiles.join(name);
            std::fs::create_dir_all(&p).unwrap();
            if !file.is_empty() {
                std::fs::write(p.join(file), b"").unwrap();
            }
        }
        profiles
    }

    #[test]
    fn discovers_sql_and_dbm_databases() {
        let dir = tempfile::tempdir().unwrap();
        let nssdb = dir.path().join("nssdb");
        std::fs::create_dir_all(&nssdb).unwrap();
        std::fs::write(nssdb.join("cert9.db"), b"").unwrap();
        let runner = Arc::new(ScriptedRunner::succeeding());
        let nss = NssTrustStore::with_roots(
            vec![nssdb.clone(), profiles(dir.path()), dir.path().join("absent")],
            runner,
            Duration::from_secs(5),
        );

        let dbs = nss.databases();
        assert_eq!(dbs.len(), 3);
        assert_eq!(dbs[0], format!("sql:{}", nssdb.display()));
        assert!(dbs[1].starts_with("sql:") && dbs[1].ends_with("a.default"));
        assert!(dbs[2].starts_with("dbm:") && dbs[2].ends_with("b.legacy"));
    }

    #[tokio::test]
    async fn install_adds_once_per_database() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_in(dir.path());
        let pem = String::from_utf8(root.pem.clone()).unwrap();
        let installed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = installed.clone();
        let runner = Arc::new(ScriptedRunner::new(move |inv| {
            let db = inv.args[2].clone();
            match inv.args[0].as_str() {
                "-L" if seen.lock().unwrap().contains(&db) => Ok(CommandOutput::ok(pem.clone())),
                "-L" => Ok(CommandOutput::failed(255, "could not find cert")),
                "-A" => {
                    seen.lock().unwrap().push(db);
                    Ok(CommandOutput::ok(""))
                }
                _ => Ok(CommandOutput::ok("")),
            }
        }));
        let nss = NssTrustStore::with_roots(
            vec![profiles(dir.path())],
            runner.clone(),
            Duration::from_secs(5),
        );

        let first = nss.install(&root).await;
        assert!(first.success && !first.already_present);
        let second = nss.install(&root).await;
        assert!(second.success && second.already_present);
        assert!(nss.is_installed(&root).await);

        let adds = runner
            .command_lines()
            .into_iter()
            .filter(|l| l.starts_with("certutil -A"))
            .count();
        assert_eq!(adds, 2);
    }

    #[tokio::test]
    async fn different_root_under_same_nickname_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_in(dir.path());
        let other_dir = dir.path().join("other");
        std::fs::create_dir_all(&other_dir).unwrap();
        let other = String::from_utf8(root_in(&other_dir).pem).unwrap();
        let runner = Arc::new(ScriptedRunner::new(move |_| Ok(CommandOutput::ok(other.clone()))));
        let nss = NssTrustStore::with_roots(vec![profiles(dir.path())], runner, Duration::from_secs(5));

        assert!(!nss.is_installed(&root).await);
    }

    #[tokio::test]
    async fn no_databases_is_a_reported_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_in(dir.path());
        let runner = Arc::new(ScriptedRunner::succeeding());
        let nss = NssTrustStore::with_roots(vec![dir.path().join("none")], runner.clone(), Duration::from_secs(5));

        let result = nss.install(&root).await;
        assert!(!result.success);
        assert!(runner.calls().is_empty());
    }
}

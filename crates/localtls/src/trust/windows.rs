//! Windows root store via `certutil`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{RootCertificate, TrustStrategy};
use crate::runner::{describe_failure, CommandRunner};
use localtls_core::{InstallResult, StoreKind, TrustRecord};

const STORE: &str = "windows";

/// Machine root store, degrading to the current-user root store.
pub struct WindowsTrustStore {
    program: String,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl WindowsTrustStore {
    /// Strategy using the system `certutil.exe`.
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            program: "certutil".to_string(),
            runner,
            timeout,
        }
    }

    fn scope_args(kind: StoreKind) -> Vec<String> {
        match kind {
            StoreKind::User => vec!["-user".to_string()],
            _ => Vec::new(),
        }
    }

    /// `certutil [-user] -store Root <sha1>` exits 0 only if the cert is there.
    async fn holds(&self, kind: StoreKind, root: &RootCertificate) -> bool {
        let mut args = Self::scope_args(kind);
        args.extend([
            "-store".to_string(),
            "Root".to_string(),
            root.info.thumbprint.clone(),
        ]);
        matches!(
            self.runner.run(&self.program, &args, self.timeout).await,
            Ok(output) if output.success()
        )
    }

    /// `-f` overwrites an existing entry, so repeats never duplicate.
    async fn add(&self, kind: StoreKind, root: &RootCertificate) -> Result<(), String> {
        let mut args = Self::scope_args(kind);
        args.extend([
            "-addstore".to_string(),
            "-f".to_string(),
            "Root".to_string(),
            root.path.display().to_string(),
        ]);
        match self.runner.run(&self.program, &args, self.timeout).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(describe_failure(&output)),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[async_trait]
impl TrustStrategy for WindowsTrustStore {
    fn name(&self) -> &'static str {
        STORE
    }

    fn kind(&self) -> StoreKind {
        StoreKind::System
    }

    async fn records(&self, root: &RootCertificate) -> Vec<TrustRecord> {
        let mut records = Vec::with_capacity(2);
        for (kind, location) in [
            (StoreKind::System, "Cert:\\LocalMachine\\Root"),
            (StoreKind::User, "Cert:\\CurrentUser\\Root"),
        ] {
            records.push(TrustRecord {
                store: STORE.to_string(),
                kind,
                location: Some(location.to_string()),
                installed: self.holds(kind, root).await,
            });
        }
        records
    }

    async fn install(&self, root: &RootCertificate) -> InstallResult {
        for kind in [StoreKind::System, StoreKind::User] {
            if self.holds(kind, root).await {
                return InstallResult::unchanged(STORE, kind);
            }
        }

        let machine_err = match self.add(StoreKind::System, root).await {
            Ok(()) => return InstallResult::installed(STORE, StoreKind::System),
            Err(e) => e,
        };

        // Privilege failure on the machine store: trust for this user only.
        match self.add(StoreKind::User, root).await {
            Ok(()) => InstallResult {
                reason: Some(format!(
                    "machine store refused ({machine_err}); trusted for current user only"
                )),
                ..InstallResult::installed(STORE, StoreKind::User)
            },
            Err(user_err) => InstallResult::failed(
                STORE,
                StoreKind::System,
                format!("machine store: {machine_err}; user store: {user_err}"),
            ),
        }
    }
}

//! Adapter for an external, pre-trusted local CA tool (mkcert-compatible CLI).
//!
//! The tool owns its own root (under `$(tool -CAROOT)`) and, once that root
//! has been installed on a machine, every certificate it issues is trusted
//! without further action. Every failure here is a [`TlsError::ToolInvocation`]
//! and callers fall back to the internal CA.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::runner::{self, CommandRunner};
use crate::store::{FileMode, KeyPairStore};
use localtls_core::{Result, TlsError};

/// File name of the root certificate inside the tool's CAROOT.
const ROOT_CERT_NAME: &str = "rootCA.pem";

/// Paths produced by the external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCertificates {
    /// Leaf certificate (installed at `certs/server.crt`)
    pub cert_path: PathBuf,
    /// Leaf key (installed at `certs/server.key`)
    pub key_path: PathBuf,
    /// The tool's root certificate
    pub root_ca_path: PathBuf,
}

/// Drives the external CA tool through a [`CommandRunner`].
#[derive(Clone)]
pub struct ExternalToolAdapter {
    binary: String,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl std::fmt::Debug for ExternalToolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalToolAdapter")
            .field("binary", &self.binary)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ExternalToolAdapter {
    /// Adapter for `binary`, each call bounded by `timeout`.
    pub fn new(binary: impl Into<String>, runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            runner,
            timeout,
        }
    }

    /// Tool binary name.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Probe `PATH` for the tool. Spawns nothing.
    pub fn is_available(&self) -> bool {
        let found = runner::which(&self.binary);
        debug!(tool = %self.binary, found = ?found, "probed external tool");
        found.is_some()
    }

    /// Location of the tool's root certificate.
    pub async fn root_ca_path(&self) -> Result<PathBuf> {
        let output = self
            .runner
            .run_checked(&self.binary, &runner::args(["-CAROOT"]), self.timeout)
            .await?;
        let dir = output.stdout.trim();
        if dir.is_empty() {
            return Err(TlsError::tool(&self.binary, "-CAROOT printed nothing"));
        }
        Ok(Path::new(dir).join(ROOT_CERT_NAME))
    }

    /// Issue a leaf for `hostnames` into the store's server paths.
    ///
    /// The tool writes to temporary names which are then renamed over
    /// `server.crt` / `server.key`, so readers never see a partial pair file.
    pub async fn generate(
        &self,
        hostnames: &[String],
        store: &KeyPairStore,
    ) -> Result<ExternalCertificates> {
        if !self.is_available() {
            return Err(TlsError::tool(&self.binary, "not found on PATH"));
        }
        store
            .ensure_dir()
            .map_err(|e| TlsError::tool(&self.binary, e.to_string()))?;

        let paths = store.paths();
        let staging = tempfile::Builder::new()
            .prefix(".localtls-external-")
            .tempdir_in(&paths.dir)
            .map_err(|e| TlsError::tool(&self.binary, format!("cannot create staging dir: {e}")))?;
        let tmp_cert = staging.path().join("server.crt");
        let tmp_key = staging.path().join("server.key");

        let mut args = vec![
            "-cert-file".to_string(),
            tmp_cert.display().to_string(),
            "-key-file".to_string(),
            tmp_key.display().to_string(),
        ];
        args.extend(hostnames.iter().cloned());

        self.runner
            .run_checked(&self.binary, &args, self.timeout)
            .await?;

        let cert = std::fs::read(&tmp_cert)
            .map_err(|e| TlsError::tool(&self.binary, format!("no certificate written: {e}")))?;
        let key = std::fs::read(&tmp_key)
            .map_err(|e| TlsError::tool(&self.binary, format!("no key written: {e}")))?;
        crate::inspect::parse_pem(&cert, &tmp_cert)
            .map_err(|e| TlsError::tool(&self.binary, format!("unusable certificate: {e}")))?;

        let root_ca_path = self.root_ca_path().await?;

        store.write(&paths.server_key, &key, FileMode::Secret)?;
        store.write(&paths.server_cert, &cert, FileMode::Public)?;
        info!(
            tool = %self.binary,
            cert = %paths.server_cert.display(),
            root = %root_ca_path.display(),
            "issued leaf certificate with external tool"
        );

        Ok(ExternalCertificates {
            cert_path: paths.server_cert.clone(),
            key_path: paths.server_key.clone(),
            root_ca_path,
        })
    }

    /// Ask the tool to install its own root into the system stores.
    pub async fn install_root(&self) -> bool {
        match self
            .runner
            .run_checked(&self.binary, &runner::args(["-install"]), self.timeout)
            .await
        {
            Ok(_) => {
                info!(tool = %self.binary, "external tool installed its root");
                true
            }
            Err(e) => {
                warn!(tool = %self.binary, error = %e, "external tool could not install its root");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, ScriptedRunner};

    fn adapter(runner: Arc<ScriptedRunner>) -> ExternalToolAdapter {
        ExternalToolAdapter::new("localtls-missing-tool", runner, Duration::from_secs(5))
    }

    #[test]
    fn missing_tool_is_unavailable() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        assert!(!adapter(runner.clone()).is_available());
        assert!(runner.calls().is_empty(), "availability check must not spawn");
    }

    #[tokio::test]
    async fn generate_without_tool_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyPairStore::at(dir.path());
        let runner = Arc::new(ScriptedRunner::succeeding());
        let err = adapter(runner)
            .generate(&["localhost".to_string()], &store)
            .await
            .unwrap_err();
        assert!(err.is_fallback_trigger());
        assert!(!store.paths().server_cert.exists());
    }

    #[tokio::test]
    async fn root_path_comes_from_caroot() {
        let runner = Arc::new(ScriptedRunner::new(|inv| {
            assert_eq!(inv.args, vec!["-CAROOT"]);
            Ok(CommandOutput::ok("/home/dev/.local/share/mkcert\n"))
        }));
        let path = adapter(runner).root_ca_path().await.unwrap();
        assert_eq!(path, Path::new("/home/dev/.local/share/mkcert/rootCA.pem"));
    }

    #[tokio::test]
    async fn install_root_reports_failure_as_false() {
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(CommandOutput::failed(1, "no sudo"))));
        assert!(!adapter(runner.clone()).install_root().await);
        assert_eq!(runner.command_lines(), vec!["localtls-missing-tool -install"]);
    }

    #[tokio::test]
    async fn timeout_is_tool_error() {
        let runner = Arc::new(ScriptedRunner::new(|inv| {
            Err(TlsError::tool(&inv.program, "timed out after 5s"))
        }));
        let err = adapter(runner).root_ca_path().await.unwrap_err();
        assert!(err.is_fallback_trigger());
    }
}

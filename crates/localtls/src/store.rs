//! Key and certificate persistence.
//!
//! [`KeyPairStore`] is the only component that touches raw key material on
//! disk. Every write goes to a temporary file in the target directory and is
//! renamed over the final path, so a concurrent reader sees either the old
//! file or the new one, never a torn write.

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use localtls_core::{GenerationState, Result, TlsError};

/// Mode for private keys.
#[cfg(unix)]
const SECRET_MODE: u32 = 0o600;
/// Mode for public certificates.
#[cfg(unix)]
const PUBLIC_MODE: u32 = 0o644;
/// Mode for generated shell scripts.
#[cfg(unix)]
const SCRIPT_MODE: u32 = 0o755;

/// File layout under the app-owned root.
///
/// ```text
/// certs/
///   ca.crt, ca.key
///   server.crt, server.key
///   cert_config.toml, cert_state.json
///   client_bundle/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    /// `certs/`
    pub dir: PathBuf,
    /// Internal root certificate
    pub ca_cert: PathBuf,
    /// Internal root private key
    pub ca_key: PathBuf,
    /// Current leaf certificate
    pub server_cert: PathBuf,
    /// Current leaf private key
    pub server_key: PathBuf,
    /// Default bundle output directory
    pub bundle_dir: PathBuf,
    /// Optional TOML configuration
    pub config: PathBuf,
    /// Issuance bookkeeping
    pub state: PathBuf,
}

impl CertPaths {
    /// Layout rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let dir = root.as_ref().join("certs");
        Self {
            ca_cert: dir.join("ca.crt"),
            ca_key: dir.join("ca.key"),
            server_cert: dir.join("server.crt"),
            server_key: dir.join("server.key"),
            bundle_dir: dir.join("client_bundle"),
            config: dir.join("cert_config.toml"),
            state: dir.join("cert_state.json"),
            dir,
        }
    }
}

/// How a file written by the store may be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Owner read/write only
    Secret,
    /// World readable
    Public,
    /// World readable and executable
    Script,
}

/// Reads and writes keys, certificates and bookkeeping under [`CertPaths`].
#[derive(Debug, Clone)]
pub struct KeyPairStore {
    paths: CertPaths,
}

impl KeyPairStore {
    /// Store over the given layout.
    pub const fn new(paths: CertPaths) -> Self {
        Self { paths }
    }

    /// Store rooted at `root`.
    pub fn at(root: impl AsRef<Path>) -> Self {
        Self::new(CertPaths::new(root))
    }

    /// The file layout.
    pub const fn paths(&self) -> &CertPaths {
        &self.paths
    }

    /// Create `certs/` if missing.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.dir).map_err(|e| TlsError::fs(&self.paths.dir, e))
    }

    /// Read a file; `Ok(None)` if it does not exist.
    pub fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TlsError::fs(path, e)),
        }
    }

    /// Read a UTF-8 file; `Ok(None)` if it does not exist.
    pub fn read_string(&self, path: &Path) -> Result<Option<String>> {
        self.read(path)?
            .map(|bytes| String::from_utf8(bytes).map_err(|e| TlsError::corrupt(path, e)))
            .transpose()
    }

    /// Atomically replace `path` with `contents`.
    pub fn write(&self, path: &Path, contents: &[u8], mode: FileMode) -> Result<()> {
        write_atomic(path, contents, mode)
    }

    /// Write a key and its certificate, key first.
    ///
    /// Each file is replaced atomically; the pair as a whole is not, so a
    /// reader racing this call can briefly see a new key next to the old
    /// certificate and should retry on handshake failure.
    pub fn write_pair(
        &self,
        cert_path: &Path,
        cert_pem: &str,
        key_path: &Path,
        key_pem: &str,
    ) -> Result<()> {
        self.ensure_dir()?;
        self.write(key_path, key_pem.as_bytes(), FileMode::Secret)?;
        self.write(cert_path, cert_pem.as_bytes(), FileMode::Public)
    }

    /// Load issuance bookkeeping, if any.
    ///
    /// An unreadable state file is ignored; it only feeds the health report.
    pub fn load_state(&self) -> Option<GenerationState> {
        let bytes = self.read(&self.paths.state).ok()??;
        match serde_json::from_slice(&bytes) {
            Ok(state) => Some(state),
            Err(e) => {
                debug!(path = %self.paths.state.display(), error = %e, "ignoring unreadable state file");
                None
            }
        }
    }

    /// Persist issuance bookkeeping.
    pub fn save_state(&self, state: &GenerationState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        self.ensure_dir()?;
        self.write(&self.paths.state, &json, FileMode::Public)
    }

    /// Remove a file if present.
    pub fn remove(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TlsError::fs(path, e)),
        }
    }
}

/// Write to a sibling temp file, fix permissions, then rename over `path`.
pub fn write_atomic(path: &Path, contents: &[u8], mode: FileMode) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| TlsError::fs(dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".localtls-")
        .tempfile_in(dir)
        .map_err(|e| TlsError::fs(dir, e))?;
    tmp.write_all(contents).map_err(|e| TlsError::fs(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| TlsError::fs(tmp.path(), e))?;
    set_mode(tmp.path(), mode)?;

    tmp.persist(path).map_err(|e| TlsError::fs(path, e.error))?;
    debug!(path = %path.display(), ?mode, "wrote file");
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: FileMode) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = match mode {
        FileMode::Secret => SECRET_MODE,
        FileMode::Public => PUBLIC_MODE,
        FileMode::Script => SCRIPT_MODE,
    };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(bits))
        .map_err(|e| TlsError::fs(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: FileMode) -> Result<()> {
    Ok(())
}

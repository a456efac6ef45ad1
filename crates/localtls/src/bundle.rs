//! Client trust bundle export.

use std::path::Path;
use tracing::info;

use crate::instructions::{self, InstallContext, BUNDLE_CA_NAME};
use crate::store::{FileMode, KeyPairStore};
use localtls_core::{BundleManifest, Result, TlsConfig, TlsError};

/// Windows installer file name.
pub const WINDOWS_SCRIPT_NAME: &str = "install_certificate_windows.bat";
/// macOS / Linux installer file name.
pub const UNIX_SCRIPT_NAME: &str = "install_certificate_unix.sh";
/// Instructions file name.
pub const README_NAME: &str = "README.md";

/// Writes the CA plus standalone installers into a directory.
#[derive(Debug, Clone)]
pub struct BundleExporter {
    store: KeyPairStore,
    config: TlsConfig,
}

impl BundleExporter {
    /// Exporter for the CA in `store`.
    pub const fn new(store: KeyPairStore, config: TlsConfig) -> Self {
        Self { store, config }
    }

    /// Export into `output_dir`, replacing any previous bundle files.
    ///
    /// Nothing is written when no CA exists yet.
    pub fn export(&self, output_dir: &Path) -> Result<BundleManifest> {
        let paths = self.store.paths();
        let Some(ca_pem) = self.store.read(&paths.ca_cert)? else {
            return Err(TlsError::NoCertificateAuthority {
                path: paths.ca_cert.clone(),
            });
        };
        let ctx = InstallContext::from_store(&self.store, &self.config)?.for_bundle();

        std::fs::create_dir_all(output_dir).map_err(|e| TlsError::fs(output_dir, e))?;
        let manifest = BundleManifest {
            directory: output_dir.to_path_buf(),
            ca_certificate: output_dir.join(BUNDLE_CA_NAME),
            windows_script: output_dir.join(WINDOWS_SCRIPT_NAME),
            unix_script: output_dir.join(UNIX_SCRIPT_NAME),
            readme: output_dir.join(README_NAME),
            fingerprint: ctx.fingerprint.clone(),
        };

        self.store
            .write(&manifest.ca_certificate, &ca_pem, FileMode::Public)?;
        self.store.write(
            &manifest.windows_script,
            instructions::windows_script(&ctx).as_bytes(),
            FileMode::Public,
        )?;
        self.store.write(
            &manifest.unix_script,
            instructions::unix_script(&ctx).as_bytes(),
            FileMode::Script,
        )?;
        self.store.write(
            &manifest.readme,
            instructions::render_markdown(&ctx, None).as_bytes(),
            FileMode::Public,
        )?;

        info!(
            directory = %output_dir.display(),
            fingerprint = %manifest.fingerprint,
            "exported client trust bundle"
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::CertificateAuthority;

    #[test]
    fn export_without_ca_fails_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyPairStore::at(dir.path());
        let out = dir.path().join("bundle");

        let err = BundleExporter::new(store, TlsConfig::default())
            .export(&out)
            .unwrap_err();
        assert!(matches!(err, TlsError::NoCertificateAuthority { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn bundled_ca_matches_store_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyPairStore::at(dir.path());
        let config = TlsConfig::default();
        CertificateAuthority::ensure(&store, &config).unwrap();
        let out = store.paths().bundle_dir.clone();

        let manifest = BundleExporter::new(store.clone(), config).export(&out).unwrap();

        assert_eq!(
            std::fs::read(&manifest.ca_certificate).unwrap(),
            std::fs::read(&store.paths().ca_cert).unwrap()
        );
        for file in manifest.files() {
            assert!(file.is_file(), "{}", file.display());
        }
        let readme = std::fs::read_to_string(&manifest.readme).unwrap();
        assert!(readme.contains(&manifest.fingerprint));
        assert!(readme.contains("**CA certificate**: ca_certificate.crt"));
        assert!(!readme.contains(&*dir.path().to_string_lossy()));
    }

    #[cfg(unix)]
    #[test]
    fn unix_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = KeyPairStore::at(dir.path());
        let config = TlsConfig::default();
        CertificateAuthority::ensure(&store, &config).unwrap();

        let manifest = BundleExporter::new(store, config)
            .export(&dir.path().join("out"))
            .unwrap();
        let mode = std::fs::metadata(&manifest.unix_script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn re_export_replaces_stale_ca() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyPairStore::at(dir.path());
        let config = TlsConfig::default();
        let out = dir.path().join("out");
        CertificateAuthority::ensure(&store, &config).unwrap();
        let exporter = BundleExporter::new(store.clone(), config.clone());
        let first = exporter.export(&out).unwrap();

        std::fs::write(&store.paths().ca_cert, b"").unwrap();
        CertificateAuthority::ensure(&store, &config).unwrap();
        let second = exporter.export(&out).unwrap();

        assert_ne!(first.fingerprint, second.fingerprint);
        assert_eq!(
            std::fs::read(&second.ca_certificate).unwrap(),
            std::fs::read(&store.paths().ca_cert).unwrap()
        );
    }
}

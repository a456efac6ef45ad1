//! Client trust bundle manifest.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Files written by a bundle export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Bundle directory
    pub directory: PathBuf,
    /// Copy of the CA public certificate
    pub ca_certificate: PathBuf,
    /// Windows installer script
    pub windows_script: PathBuf,
    /// macOS / Linux installer script
    pub unix_script: PathBuf,
    /// Plain-language instructions
    pub readme: PathBuf,
    /// SHA-256 fingerprint of the bundled CA
    pub fingerprint: String,
}

impl BundleManifest {
    /// Every file in the bundle.
    #[must_use]
    pub fn files(&self) -> [&PathBuf; 4] {
        [
            &self.ca_certificate,
            &self.windows_script,
            &self.unix_script,
            &self.readme,
        ]
    }
}

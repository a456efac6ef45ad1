//! Certificate subsystem configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TlsError};

/// Hostnames every leaf certificate must cover.
pub const DEFAULT_HOSTNAMES: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Shortest CA validity window in days (10 years).
pub const MIN_CA_VALIDITY_DAYS: u32 = 10 * 365;

/// Longest leaf validity accepted, matching the browser ceiling for private roots.
pub const MAX_LEAF_VALIDITY_DAYS: u32 = 825;

/// Configuration for certificate issuance and trust management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Hostnames and IP literals the server must be reachable under.
    #[serde(default = "default_hostnames")]
    pub hostnames: Vec<String>,

    /// Leaf certificate validity in days.
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,

    /// Organization baked into certificate subjects.
    #[serde(default = "default_organization")]
    pub organization: String,

    /// Two-letter country code for certificate subjects.
    #[serde(default = "default_country")]
    pub country: String,

    /// Prefer the external pre-trusted CA tool over internal generation.
    #[serde(default = "default_true")]
    pub prefer_external_tool: bool,

    /// External tool binary name or path.
    #[serde(default = "default_external_tool")]
    pub external_tool: String,

    /// Renew leaves this many days before expiry.
    #[serde(default = "default_renewal_threshold")]
    pub renewal_threshold_days: u32,

    /// Hard timeout for every external subprocess (seconds).
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// HTTPS port quoted in instructions and bundle scripts.
    #[serde(default = "default_https_port")]
    pub https_port: u16,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            hostnames: default_hostnames(),
            validity_days: default_validity_days(),
            organization: default_organization(),
            country: default_country(),
            prefer_external_tool: true,
            external_tool: default_external_tool(),
            renewal_threshold_days: default_renewal_threshold(),
            command_timeout_secs: default_command_timeout(),
            https_port: default_https_port(),
        }
    }
}

impl TlsConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| TlsError::fs(path, e))?;
        let config: Self = toml::from_str(&content).map_err(|e| TlsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TlsError::fs(parent, e))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TlsError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| TlsError::fs(path, e))
    }

    /// Reject values no certificate could be issued for.
    pub fn validate(&self) -> Result<()> {
        if let Some(blank) = self.hostnames.iter().find(|h| h.trim().is_empty()) {
            return Err(TlsError::Config(format!("blank hostname entry: {blank:?}")));
        }
        if self.validity_days == 0 || self.validity_days > MAX_LEAF_VALIDITY_DAYS {
            return Err(TlsError::Config(format!(
                "validity_days must be between 1 and {MAX_LEAF_VALIDITY_DAYS}, got {}",
                self.validity_days
            )));
        }
        if self.organization.trim().is_empty() {
            return Err(TlsError::Config("organization must not be empty".into()));
        }
        if self.command_timeout_secs == 0 {
            return Err(TlsError::Config("command_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Configured hostnames united with the mandatory loopback names.
    ///
    /// Order is stable: loopback names first, then configured entries in the
    /// order given, duplicates dropped.
    #[must_use]
    pub fn required_hostnames(&self) -> Vec<String> {
        merge_hostnames(&self.hostnames)
    }

    /// CA lifetime: twice the leaf lifetime, never under ten years.
    #[must_use]
    pub fn ca_validity_days(&self) -> u32 {
        self.validity_days.saturating_mul(2).max(MIN_CA_VALIDITY_DAYS)
    }

    /// Common name of the internal root.
    #[must_use]
    pub fn ca_common_name(&self) -> String {
        format!("{} Local CA", self.organization)
    }
}

/// Union of `extra` with [`DEFAULT_HOSTNAMES`], deduplicated case-insensitively.
#[must_use]
pub fn merge_hostnames<S: AsRef<str>>(extra: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let candidates = DEFAULT_HOSTNAMES
        .iter()
        .copied()
        .chain(extra.iter().map(AsRef::as_ref));
    for host in candidates {
        let host = host.trim();
        if host.is_empty() {
            continue;
        }
        if !out.iter().any(|h| h.eq_ignore_ascii_case(host)) {
            out.push(host.to_string());
        }
    }
    out
}

// Default value functions for serde.
fn default_hostnames() -> Vec<String> {
    DEFAULT_HOSTNAMES.iter().map(ToString::to_string).collect()
}

const fn default_validity_days() -> u32 {
    365
}

fn default_organization() -> String {
    String::from("Local Development")
}

fn default_country() -> String {
    String::from("US")
}

const fn default_true() -> bool {
    true
}

fn default_external_tool() -> String {
    String::from("mkcert")
}

const fn default_renewal_threshold() -> u32 {
    7
}

const fn default_command_timeout() -> u64 {
    60
}

const fn default_https_port() -> u16 {
    8000
}

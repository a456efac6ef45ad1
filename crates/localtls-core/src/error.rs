use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for localtls operations
pub type Result<T> = std::result::Result<T, TlsError>;

/// Errors produced by the certificate lifecycle subsystem.
///
/// Variants fall in two groups. Failures low in the fallback chain
/// (external tool, trust installation, expiry) are absorbed by the caller
/// and downgraded to a health status. Failures with nothing left to fall
/// back to (disk I/O, key generation, signing) abort the flow.
#[derive(Error, Debug)]
pub enum TlsError {
    /// Key material or certificate could not be read or written
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Existing certificate or key could not be parsed
    #[error("corrupt certificate material at {}: {reason}", path.display())]
    CorruptCertificate {
        /// Offending file
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// External tool missing, exited non-zero, or timed out
    #[error("{tool} invocation failed: {reason}")]
    ToolInvocation {
        /// Binary name
        tool: String,
        /// What went wrong
        reason: String,
    },

    /// A trust store refused the CA certificate
    #[error("trust store '{store}' install failed: {reason}")]
    TrustInstall {
        /// Store name
        store: String,
        /// What went wrong
        reason: String,
    },

    /// Key generation or signing failed inside the internal CA
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),

    /// Certificate is past its not-after date
    #[error("certificate expired at {not_after}")]
    ExpiredCertificate {
        /// Expiry timestamp
        not_after: DateTime<Utc>,
    },

    /// Bundle export requested before any CA exists
    #[error("no certificate authority found at {}", path.display())]
    NoCertificateAuthority {
        /// Expected CA certificate path
        path: PathBuf,
    },

    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TlsError {
    /// Wrap an I/O error with the path that caused it.
    pub fn fs(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build a corrupt-certificate error.
    pub fn corrupt(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::CorruptCertificate {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Build a tool invocation error.
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ToolInvocation {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if no fallback remains below this failure.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Filesystem { .. }
                | Self::CertificateGeneration(_)
                | Self::NoCertificateAuthority { .. }
                | Self::Config(_)
        )
    }

    /// Returns true if the caller should fall back to the internal CA.
    #[must_use]
    pub const fn is_fallback_trigger(&self) -> bool {
        matches!(self, Self::ToolInvocation { .. })
    }

    /// The operator command that remediates this failure.
    #[must_use]
    pub const fn remediation(&self) -> &'static str {
        match self {
            Self::Filesystem { .. } => {
                "check permissions on the certs directory, then run `localtls generate`"
            }
            Self::CorruptCertificate { .. } | Self::ExpiredCertificate { .. } => {
                "run `localtls generate`"
            }
            Self::ToolInvocation { .. } => "run `localtls no-mkcert` to use the internal CA",
            Self::TrustInstall { .. } => {
                "run `localtls install-ca` with elevated privileges, or `localtls instructions`"
            }
            Self::CertificateGeneration(_) => "run `localtls generate --verbose` and inspect the log",
            Self::NoCertificateAuthority { .. } => "run `localtls generate` before `localtls bundle`",
            Self::Config(_) => "fix certs/cert_config.toml or the command-line flags",
            Self::Json(_) => "delete certs/cert_state.json and run `localtls generate`",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(TlsError::fs("/tmp/ca.key", io).is_fatal());
        assert!(TlsError::CertificateGeneration("boom".into()).is_fatal());
        assert!(!TlsError::tool("mkcert", "not found").is_fatal());
        assert!(!TlsError::TrustInstall {
            store: "system".into(),
            reason: "denied".into()
        }
        .is_fatal());
    }

    #[test]
    fn tool_errors_trigger_fallback() {
        assert!(TlsError::tool("mkcert", "timed out after 60s").is_fallback_trigger());
        assert!(!TlsError::corrupt("ca.crt", "empty").is_fallback_trigger());
    }

    #[test]
    fn display_names_the_path() {
        let err = TlsError::corrupt("/srv/certs/ca.crt", "no PEM block");
        let msg = err.to_string();
        assert!(msg.contains("/srv/certs/ca.crt"), "message: {msg}");
        assert!(msg.contains("no PEM block"), "message: {msg}");
    }

    #[test]
    fn remediation_mentions_command() {
        let err = TlsError::NoCertificateAuthority {
            path: "certs/ca.crt".into(),
        };
        assert!(err.remediation().contains("localtls generate"));
    }
}

//! Trust store records.

use serde::{Deserialize, Serialize};

use crate::error::TlsError;

/// Which kind of trust store a record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Operating-system root store (machine scope)
    System,
    /// Operating-system root store scoped to the current user
    User,
    /// Browser-private certificate database (NSS)
    Browser,
}

impl StoreKind {
    /// Operating-system scope. Browser databases only cover one application.
    #[must_use]
    pub const fn is_os_store(self) -> bool {
        matches!(self, Self::System | Self::User)
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Browser => write!(f, "browser"),
        }
    }
}

/// Whether the CA is present in one trust store instance.
///
/// Derived on demand by looking up the CA fingerprint, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    /// Strategy name (e.g. "linux", "windows", "nss")
    pub store: String,
    /// Store scope
    pub kind: StoreKind,
    /// Concrete location (keychain path, NSS profile, anchor file)
    pub location: Option<String>,
    /// CA fingerprint found in the store
    pub installed: bool,
}

/// Outcome of one install attempt.
///
/// Failure here is never fatal: the server still starts with an untrusted
/// certificate and health drops to degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResult {
    /// Strategy name
    pub store: String,
    /// Scope actually written to
    pub kind: StoreKind,
    /// CA is trusted by this store after the call
    pub success: bool,
    /// The CA was already present, nothing written
    pub already_present: bool,
    /// Why the install failed or degraded
    pub reason: Option<String>,
}

impl InstallResult {
    /// Successful install.
    #[must_use]
    pub fn installed(store: &str, kind: StoreKind) -> Self {
        Self {
            store: store.to_string(),
            kind,
            success: true,
            already_present: false,
            reason: None,
        }
    }

    /// CA already present; idempotent no-op.
    #[must_use]
    pub fn unchanged(store: &str, kind: StoreKind) -> Self {
        Self {
            already_present: true,
            ..Self::installed(store, kind)
        }
    }

    /// Failed install with a reason.
    #[must_use]
    pub fn failed(store: &str, kind: StoreKind, reason: impl Into<String>) -> Self {
        Self {
            store: store.to_string(),
            kind,
            success: false,
            already_present: false,
            reason: Some(reason.into()),
        }
    }

    /// The failure as a [`TlsError::TrustInstall`], `None` on success.
    #[must_use]
    pub fn error(&self) -> Option<TlsError> {
        (!self.success).then(|| TlsError::TrustInstall {
            store: self.store.clone(),
            reason: self.reason.clone().unwrap_or_else(|| "unknown failure".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failures_become_errors() {
        assert!(InstallResult::installed("linux", StoreKind::System).error().is_none());
        let err = InstallResult::failed("nss", StoreKind::Browser, "certutil missing")
            .error()
            .unwrap();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("certutil missing"));
    }
}

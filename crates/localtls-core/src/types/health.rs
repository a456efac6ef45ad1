//! Health report types and the classification rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cert::{CertificateInfo, CertificateSource};
use super::trust::TrustRecord;

/// Overall health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Trusted, valid, and outside the renewal window
    Healthy,
    /// Usable but untrusted, expiring soon, or missing a hostname
    Degraded,
    /// Expired, missing, or unparsable
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Leaf certificate findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafHealth {
    /// `server.crt` exists
    pub cert_present: bool,
    /// `server.key` exists
    pub key_present: bool,
    /// Parsed certificate, if it parsed
    pub info: Option<CertificateInfo>,
    /// Parser message when the file exists but is unreadable
    pub parse_error: Option<String>,
    /// Days until not-after (negative when expired)
    pub days_until_expiry: Option<i64>,
    /// `not_before <= now < not_after`
    pub valid: bool,
    /// Inside the renewal threshold
    pub expiring_soon: bool,
    /// Required hostnames absent from the SAN list
    pub missing_hostnames: Vec<String>,
    /// Signature verifies against the issuing root (None when no root is known)
    pub chains_to_root: Option<bool>,
}

/// Aggregated health of certificates and trust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Classification
    pub status: HealthStatus,
    /// When the checks ran
    pub checked_at: DateTime<Utc>,
    /// External CA tool found on PATH
    pub external_tool_available: bool,
    /// Internal `ca.crt` exists
    pub ca_present: bool,
    /// Root the leaf is expected to chain to
    pub root: Option<CertificateInfo>,
    /// Leaf findings
    pub leaf: LeafHealth,
    /// Per-store trust lookups for the root
    pub trust: Vec<TrustRecord>,
    /// Last issuance timestamp
    pub last_generated: Option<DateTime<Utc>>,
    /// Which path issued the current leaf
    pub source: Option<CertificateSource>,
    /// Human-readable reasons behind a non-healthy status
    pub issues: Vec<String>,
}

impl HealthReport {
    /// True if an operating-system store trusts the root.
    #[must_use]
    pub fn trusted(&self) -> bool {
        os_trusted(&self.trust)
    }

    /// Deterministic classification from the collected facts.
    ///
    /// Returns the status plus the reasons for it.
    #[must_use]
    pub fn classify(leaf: &LeafHealth, trust: &[TrustRecord]) -> (HealthStatus, Vec<String>) {
        let mut unhealthy = Vec::new();
        if !leaf.cert_present {
            unhealthy.push("server certificate is missing".to_string());
        }
        if !leaf.key_present {
            unhealthy.push("server key is missing".to_string());
        }
        if let Some(err) = &leaf.parse_error {
            unhealthy.push(format!("server certificate is unreadable: {err}"));
        }
        if leaf.info.is_some() && !leaf.valid {
            unhealthy.push("server certificate is expired or not yet valid".to_string());
        }
        if !unhealthy.is_empty() {
            return (HealthStatus::Unhealthy, unhealthy);
        }

        let mut degraded = Vec::new();
        if !os_trusted(trust) {
            let browsers: Vec<&str> = trust
                .iter()
                .filter(|r| r.installed && !r.kind.is_os_store())
                .map(|r| r.store.as_str())
                .collect();
            if browsers.is_empty() {
                degraded.push("root certificate is not installed in any trust store".to_string());
            } else {
                degraded.push(format!(
                    "root certificate is only trusted by browser stores ({})",
                    browsers.join(", ")
                ));
            }
        }
        if leaf.chains_to_root == Some(false) {
            degraded.push("server certificate was not signed by the current root".to_string());
        }
        if leaf.expiring_soon {
            degraded.push(format!(
                "server certificate expires in {} days",
                leaf.days_until_expiry.unwrap_or_default()
            ));
        }
        if !leaf.missing_hostnames.is_empty() {
            degraded.push(format!(
                "server certificate does not cover: {}",
                leaf.missing_hostnames.join(", ")
            ));
        }
        if degraded.is_empty() {
            (HealthStatus::Healthy, degraded)
        } else {
            (HealthStatus::Degraded, degraded)
        }
    }
}

fn os_trusted(trust: &[TrustRecord]) -> bool {
    trust.iter().any(|r| r.installed && r.kind.is_os_store())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoreKind;

    fn good_leaf() -> LeafHealth {
        LeafHealth {
            cert_present: true,
            key_present: true,
            info: None,
            parse_error: None,
            days_until_expiry: Some(300),
            valid: true,
            expiring_soon: false,
            missing_hostnames: Vec::new(),
            chains_to_root: Some(true),
        }
    }

    fn record(installed: bool) -> TrustRecord {
        TrustRecord {
            store: "linux".into(),
            kind: StoreKind::System,
            location: None,
            installed,
        }
    }

    #[test]
    fn trusted_valid_leaf_is_healthy() {
        let (status, issues) = HealthReport::classify(&good_leaf(), &[record(true)]);
        assert_eq!(status, HealthStatus::Healthy);
        assert!(issues.is_empty());
    }

    #[test]
    fn untrusted_leaf_is_degraded() {
        let (status, issues) = HealthReport::classify(&good_leaf(), &[record(false)]);
        assert_eq!(status, HealthStatus::Degraded);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn browser_only_trust_is_degraded() {
        let nss = TrustRecord {
            store: "nss".into(),
            kind: StoreKind::Browser,
            location: Some("sql:/home/dev/.pki/nssdb".into()),
            installed: true,
        };
        let (status, issues) = HealthReport::classify(&good_leaf(), &[record(false), nss.clone()]);
        assert_eq!(status, HealthStatus::Degraded);
        assert!(issues[0].contains("only trusted by browser stores (nss)"), "{issues:?}");

        let user = TrustRecord {
            store: "windows".into(),
            kind: StoreKind::User,
            location: None,
            installed: true,
        };
        let (status, _) = HealthReport::classify(&good_leaf(), &[record(false), user, nss]);
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn expiring_leaf_is_degraded() {
        let leaf = LeafHealth {
            expiring_soon: true,
            days_until_expiry: Some(3),
            ..good_leaf()
        };
        let (status, issues) = HealthReport::classify(&leaf, &[record(true)]);
        assert_eq!(status, HealthStatus::Degraded);
        assert!(issues[0].contains("3 days"));
    }

    #[test]
    fn missing_leaf_is_unhealthy() {
        let (status, _) = HealthReport::classify(&LeafHealth::default(), &[record(true)]);
        assert_eq!(status, HealthStatus::Unhealthy);
    }

    #[test]
    fn status_orders_by_severity() {
        assert!(HealthStatus::Healthy < HealthStatus::Degraded);
        assert!(HealthStatus::Degraded < HealthStatus::Unhealthy);
    }
}

//! Certificate summary types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// SHA-256 fingerprint of a certificate's DER encoding (lowercase hex).
pub type CertFingerprint = String;

/// Role of a certificate on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateKind {
    /// Self-signed root allowed to sign others
    Authority,
    /// Server certificate signed by a root
    Leaf,
}

/// Who issued the current leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateSource {
    /// Signed by the internal CA in `certs/ca.key`
    Internal,
    /// Produced by the external pre-trusted CA tool
    External,
}

impl std::fmt::Display for CertificateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Parsed view of a certificate file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// File the certificate was read from
    pub path: String,
    /// SHA-256 fingerprint of DER bytes (hex)
    pub fingerprint: CertFingerprint,
    /// SHA-1 thumbprint, the identifier Windows stores use (hex)
    pub thumbprint: String,
    /// Subject distinguished name (human-readable)
    pub subject: String,
    /// Issuer distinguished name (human-readable)
    pub issuer: String,
    /// Serial number (hex)
    pub serial: String,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// Subject alternative names, DNS and IP entries rendered as text
    pub san: Vec<String>,
    /// Authority or leaf
    pub kind: CertificateKind,
}

impl CertificateInfo {
    /// `not_before <= now < not_after`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now < self.not_after
    }

    /// Whole days left before expiry (negative once expired).
    #[must_use]
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.not_after - now).num_days()
    }

    /// True if the certificate expires within `days` of `now`.
    #[must_use]
    pub fn expires_within(&self, days: u32, now: DateTime<Utc>) -> bool {
        self.not_after <= now + Duration::days(i64::from(days))
    }

    /// Hostnames from `required` that the SAN list does not cover.
    ///
    /// IP literals are compared in canonical form so `::1` matches
    /// `0:0:0:0:0:0:0:1`.
    #[must_use]
    pub fn missing_hostnames<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        required
            .iter()
            .map(AsRef::as_ref)
            .filter(|host| !self.san.iter().any(|san| san_matches(san, host)))
            .map(ToString::to_string)
            .collect()
    }

    /// True if the SAN set is a superset of `required`.
    #[must_use]
    pub fn covers<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.missing_hostnames(required).is_empty()
    }
}

fn san_matches(san: &str, host: &str) -> bool {
    match (san.parse::<std::net::IpAddr>(), host.parse::<std::net::IpAddr>()) {
        (Ok(a), Ok(b)) => a == b,
        (Err(_), Err(_)) => san.eq_ignore_ascii_case(host),
        _ => false,
    }
}

/// Bookkeeping persisted next to the certificates after each issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationState {
    /// When the current leaf was written
    pub last_generated: DateTime<Utc>,
    /// Which path produced it
    pub source: CertificateSource,
    /// Hostnames requested at issuance
    pub hostnames: Vec<String>,
}

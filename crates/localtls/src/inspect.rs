//! X.509 parsing: certificate summaries, chain checks and trust bundle scans.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;

use crate::hash::{sha1_bytes, sha256_bytes};
use localtls_core::{CertificateInfo, CertificateKind, Result, TlsError};

/// System CA bundles consulted when looking for an installed root.
pub const SYSTEM_BUNDLE_PATHS: &[&str] = &[
    // Debian / Ubuntu / Arch
    "/etc/ssl/certs/ca-certificates.crt",
    // Fedora / RHEL
    "/etc/pki/tls/certs/ca-bundle.crt",
    // SUSE
    "/etc/ssl/ca-bundle.pem",
    // Alpine
    "/etc/ssl/cert.pem",
    // p11-kit extracted anchors
    "/etc/ca-certificates/extracted/tls-ca-bundle.pem",
];

/// A certificate file decoded to DER plus its summary.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    /// DER bytes of the first certificate in the file
    pub der: Vec<u8>,
    /// Summary
    pub info: CertificateInfo,
}

/// Parse the first CERTIFICATE block of a PEM document.
pub fn parse_pem(content: &[u8], source: &Path) -> Result<ParsedCertificate> {
    let blocks = pem::parse_many(content).map_err(|e| TlsError::corrupt(source, e))?;
    let block = blocks
        .into_iter()
        .find(|p| p.tag() == "CERTIFICATE")
        .ok_or_else(|| TlsError::corrupt(source, "no CERTIFICATE block"))?;
    let der = block.into_contents();
    let info = summarize(&der, source)?;
    Ok(ParsedCertificate { der, info })
}

/// Read and parse a certificate file; `Ok(None)` if it does not exist.
pub fn read_certificate(path: &Path) -> Result<Option<ParsedCertificate>> {
    let content = match std::fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TlsError::fs(path, e)),
    };
    parse_pem(&content, path).map(Some)
}

/// Build a [`CertificateInfo`] from DER bytes.
pub fn summarize(der: &[u8], source: &Path) -> Result<CertificateInfo> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der).map_err(|e| TlsError::corrupt(source, e))?;

    let kind = if cert.is_ca() {
        CertificateKind::Authority
    } else {
        CertificateKind::Leaf
    };

    Ok(CertificateInfo {
        path: source.display().to_string(),
        fingerprint: sha256_bytes(der),
        thumbprint: sha1_bytes(der),
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before: asn1_to_utc(cert.validity().not_before),
        not_after: asn1_to_utc(cert.validity().not_after),
        san: san_entries(&cert),
        kind,
    })
}

/// True if `leaf_der` carries a valid signature from `root_der`'s key.
#[must_use]
pub fn verify_issued_by(leaf_der: &[u8], root_der: &[u8]) -> bool {
    let Ok((_, leaf)) = x509_parser::parse_x509_certificate(leaf_der) else {
        return false;
    };
    let Ok((_, root)) = x509_parser::parse_x509_certificate(root_der) else {
        return false;
    };
    match leaf.verify_signature(Some(root.public_key())) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "leaf signature does not verify against root");
            false
        }
    }
}

/// Raw subject public key bits of a certificate.
pub fn public_key_bits(der: &[u8], source: &Path) -> Result<Vec<u8>> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der).map_err(|e| TlsError::corrupt(source, e))?;
    Ok(cert.public_key().subject_public_key.data.to_vec())
}

/// SHA-256 fingerprints of every certificate in a PEM bundle.
///
/// Unreadable files and unparsable entries are skipped.
#[must_use]
pub fn bundle_fingerprints(path: &Path) -> HashSet<String> {
    let Ok(content) = std::fs::read(path) else {
        return HashSet::new();
    };
    let Ok(blocks) = pem::parse_many(&content) else {
        debug!(path = %path.display(), "failed to parse CA bundle");
        return HashSet::new();
    };
    blocks
        .iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(|p| sha256_bytes(p.contents()))
        .collect()
}

fn san_entries(cert: &X509Certificate<'_>) -> Vec<String> {
    let Ok(Some(ext)) = cert.subject_alternative_name() else {
        return Vec::new();
    };
    ext.value
        .general_names
        .iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some((*dns).to_string()),
            GeneralName::IPAddress(bytes) => ip_from_bytes(bytes).map(|ip| ip.to_string()),
            _ => None,
        })
        .collect()
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Convert an ASN.1 `GeneralizedTime` / `UTCTime` to `DateTime<Utc>`.
fn asn1_to_utc(t: x509_parser::time::ASN1Time) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

//! Internal certificate authority.
//!
//! The root key pair lives in `certs/ca.key` and never leaves this module
//! except to be written by the store. Leaves are signed on demand; the CA is
//! re-read from disk before every signature so a concurrent regeneration is
//! never masked by a cached copy.

use chrono::{DateTime, Duration, Utc};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::inspect::{self, ParsedCertificate};
use crate::store::{FileMode, KeyPairStore};
use localtls_core::{CertificateInfo, Result, TlsConfig, TlsError};

/// How [`CertificateAuthority::ensure`] obtained the CA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaOrigin {
    /// Existing key and certificate parsed cleanly
    Loaded,
    /// No CA existed, a new one was created
    Generated,
    /// Existing material was corrupt and has been replaced.
    /// Every leaf signed by the old root is now untrusted.
    Regenerated,
}

/// Handle returned by [`CertificateAuthority::ensure`].
pub struct CaHandle {
    /// The usable CA
    pub ca: CertificateAuthority,
    /// Where it came from
    pub origin: CaOrigin,
}

/// Subject, SAN list and validity window for a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRequest {
    /// Subject common name
    pub common_name: String,
    /// Subject organization
    pub organization: String,
    /// Subject country
    pub country: String,
    /// SAN entries, IP literals become IP SANs
    pub hostnames: Vec<String>,
    /// Start of validity
    pub not_before: DateTime<Utc>,
    /// End of validity
    pub not_after: DateTime<Utc>,
}

impl LeafRequest {
    /// Request valid from now for `validity_days`, covering exactly `hostnames`.
    pub fn new(config: &TlsConfig, hostnames: Vec<String>, validity_days: u32) -> Self {
        let now = Utc::now();
        Self {
            common_name: hostnames
                .first()
                .cloned()
                .unwrap_or_else(|| "localhost".to_string()),
            organization: config.organization.clone(),
            country: config.country.clone(),
            hostnames,
            not_before: now,
            not_after: now + Duration::days(i64::from(validity_days)),
        }
    }
}

/// A freshly signed leaf.
#[derive(Debug, Clone)]
pub struct IssuedLeaf {
    /// Certificate PEM
    pub cert_pem: String,
    /// Private key PEM (PKCS#8)
    pub key_pem: String,
    /// Parsed summary of the certificate
    pub info: CertificateInfo,
}

/// Self-signed root able to sign server certificates.
pub struct CertificateAuthority {
    key_pair: KeyPair,
    certificate: Certificate,
    cert_pem: String,
    key_pem: String,
    der: Vec<u8>,
    /// Parsed summary of the root
    pub info: CertificateInfo,
}

impl CertificateAuthority {
    /// Return the on-disk CA, creating or replacing it as needed.
    ///
    /// Corrupt material is replaced and logged as a breaking action: every
    /// leaf the old root signed stops validating.
    pub fn ensure(store: &KeyPairStore, config: &TlsConfig) -> Result<CaHandle> {
        match Self::load(store) {
            Ok(Some(ca)) => Ok(CaHandle {
                ca,
                origin: CaOrigin::Loaded,
            }),
            Ok(None) => {
                let ca = Self::generate(config)?;
                ca.save(store)?;
                info!(
                    path = %store.paths().ca_cert.display(),
                    fingerprint = %ca.info.fingerprint,
                    "generated certificate authority"
                );
                Ok(CaHandle {
                    ca,
                    origin: CaOrigin::Generated,
                })
            }
            Err(err @ TlsError::CorruptCertificate { .. }) => {
                warn!(
                    error = %err,
                    "certificate authority is corrupt, regenerating; all previously issued \
                     leaf certificates are now invalid and the new root must be re-installed \
                     in every trust store"
                );
                let ca = Self::generate(config)?;
                ca.save(store)?;
                warn!(
                    fingerprint = %ca.info.fingerprint,
                    "replaced certificate authority"
                );
                Ok(CaHandle {
                    ca,
                    origin: CaOrigin::Regenerated,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Load the CA from disk.
    ///
    /// `Ok(None)` when neither file exists. A lone certificate or key, an
    /// unparsable file, or a key that does not match the certificate is
    /// reported as [`TlsError::CorruptCertificate`].
    pub fn load(store: &KeyPairStore) -> Result<Option<Self>> {
        let paths = store.paths();
        let cert = store.read(&paths.ca_cert)?;
        let key = store.read_string(&paths.ca_key)?;

        let (cert, key_pem) = match (cert, key) {
            (None, None) => return Ok(None),
            (Some(_), None) => return Err(TlsError::corrupt(&paths.ca_key, "CA key is missing")),
            (None, Some(_)) => {
                return Err(TlsError::corrupt(&paths.ca_cert, "CA certificate is missing"))
            }
            (Some(c), Some(k)) => (c, k),
        };

        let ParsedCertificate { der, info } = inspect::parse_pem(&cert, &paths.ca_cert)?;
        if info.kind != localtls_core::CertificateKind::Authority {
            return Err(TlsError::corrupt(&paths.ca_cert, "certificate is not a CA"));
        }

        let key_pair =
            KeyPair::from_pem(&key_pem).map_err(|e| TlsError::corrupt(&paths.ca_key, e))?;
        if inspect::public_key_bits(&der, &paths.ca_cert)? != key_pair.public_key_raw() {
            return Err(TlsError::corrupt(
                &paths.ca_key,
                "CA key does not match CA certificate",
            ));
        }

        let cert_pem = String::from_utf8(cert).map_err(|e| TlsError::corrupt(&paths.ca_cert, e))?;
        let params = CertificateParams::from_ca_cert_pem(&cert_pem)
            .map_err(|e| TlsError::corrupt(&paths.ca_cert, e))?;
        // Re-signing the parsed params yields an issuer handle carrying the
        // original subject and key identifier; the file on disk is untouched.
        let certificate = params
            .self_signed(&key_pair)
            .map_err(|e| TlsError::corrupt(&paths.ca_cert, e))?;

        Ok(Some(Self {
            key_pair,
            certificate,
            cert_pem,
            key_pem,
            der,
            info,
        }))
    }

    /// Generate a new root key pair and self-signed certificate.
    pub fn generate(config: &TlsConfig) -> Result<Self> {
        let key_pair = KeyPair::generate().map_err(generation_error)?;
        let key_pem = key_pair.serialize_pem();

        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, config.ca_common_name());
        dn.push(DnType::OrganizationName, format!("{} CA", config.organization));
        dn.push(DnType::CountryName, config.country.as_str());
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let now = Utc::now();
        params.not_before = to_offset(now)?;
        params.not_after = to_offset(now + Duration::days(i64::from(config.ca_validity_days())))?;
        params.serial_number = Some(random_serial());

        let certificate = params.self_signed(&key_pair).map_err(generation_error)?;
        let cert_pem = certificate.pem();
        let der = certificate.der().to_vec();
        let info = inspect::summarize(&der, std::path::Path::new("ca.crt"))?;

        Ok(Self {
            key_pair,
            certificate,
            cert_pem,
            key_pem,
            der,
            info,
        })
    }

    /// Persist key (owner-only) and certificate.
    pub fn save(&self, store: &KeyPairStore) -> Result<()> {
        let paths = store.paths();
        store.ensure_dir()?;
        store.write(&paths.ca_key, self.key_pem.as_bytes(), FileMode::Secret)?;
        store.write(&paths.ca_cert, self.cert_pem.as_bytes(), FileMode::Public)
    }

    /// Sign a leaf whose SAN extension mirrors `request.hostnames` exactly.
    pub fn sign_leaf(&self, request: &LeafRequest) -> Result<IssuedLeaf> {
        if request.hostnames.is_empty() {
            return Err(TlsError::CertificateGeneration(
                "leaf request has no hostnames".into(),
            ));
        }
        if request.not_after <= request.not_before {
            return Err(TlsError::CertificateGeneration(
                "leaf validity window is empty".into(),
            ));
        }

        let leaf_key = KeyPair::generate().map_err(generation_error)?;
        let key_pem = leaf_key.serialize_pem();

        let mut params =
            CertificateParams::new(request.hostnames.clone()).map_err(generation_error)?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, request.common_name.as_str());
        dn.push(DnType::OrganizationName, request.organization.as_str());
        dn.push(DnType::CountryName, request.country.as_str());
        params.distinguished_name = dn;

        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.use_authority_key_identifier_extension = true;

        params.not_before = to_offset(request.not_before)?;
        params.not_after = to_offset(request.not_after)?;
        params.serial_number = Some(random_serial());

        let cert = params
            .signed_by(&leaf_key, &self.certificate, &self.key_pair)
            .map_err(generation_error)?;
        let cert_pem = cert.pem();
        let info = inspect::summarize(cert.der(), std::path::Path::new("server.crt"))?;

        Ok(IssuedLeaf {
            cert_pem,
            key_pem,
            info,
        })
    }

    /// Root certificate PEM.
    pub fn certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Root certificate DER.
    pub fn certificate_der(&self) -> &[u8] {
        &self.der
    }

    /// True if `leaf_der` was signed by this root.
    pub fn issued(&self, leaf_der: &[u8]) -> bool {
        inspect::verify_issued_by(leaf_der, &self.der)
    }
}

/// Random 64-bit serial from a v4 UUID.
fn random_serial() -> SerialNumber {
    let bytes = Uuid::new_v4().into_bytes();
    // Clear the top bit so the DER INTEGER stays positive without padding.
    let mut serial = [0u8; 8];
    serial.copy_from_slice(&bytes[..8]);
    serial[0] &= 0x7f;
    SerialNumber::from_slice(&serial)
}

fn to_offset(dt: DateTime<Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(dt.timestamp())
        .map_err(|e| TlsError::CertificateGeneration(format!("timestamp out of range: {e}")))
}

fn generation_error(e: rcgen::Error) -> TlsError {
    TlsError::CertificateGeneration(e.to_string())
}

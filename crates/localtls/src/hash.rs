//! Certificate fingerprints via `ring::digest`.

use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY, SHA256};

/// SHA-256 of raw bytes (certificate DER), lowercase hex.
#[must_use]
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(digest(&SHA256, data).as_ref())
}

/// SHA-1 thumbprint, lowercase hex.
///
/// Only used to address certificates in the Windows certificate store,
/// which indexes by SHA-1.
#[must_use]
pub fn sha1_bytes(data: &[u8]) -> String {
    hex::encode(digest(&SHA1_FOR_LEGACY_USE_ONLY, data).as_ref())
}

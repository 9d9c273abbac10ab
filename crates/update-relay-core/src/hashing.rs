// crates/update-relay-core/src/hashing.rs
// ============================================================================
// Module: Content Hashing
// Description: Content digests used for update identifiers and asset metadata.
// Purpose: Keep manifest identifiers and asset hashes deterministic.
// Dependencies: sha2, md-5, base64, hex
// ============================================================================

//! ## Overview
//! Update identifiers are the SHA-256 of the bundle `metadata.json` laid out
//! as a UUID. Asset hashes are unpadded base64url SHA-256 digests and asset
//! keys are hex MD5 digests, which is what clients verify downloads against.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use md5::Md5;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by digest helpers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Input is not a 64-character hex SHA-256 digest.
    #[error("expected a 64-character hex sha256 digest, got `{0}`")]
    InvalidHexDigest(String),
}

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Returns the lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Returns the unpadded base64url SHA-256 of `bytes`.
#[must_use]
pub fn sha256_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(bytes))
}

/// Returns the lowercase hex MD5 of `bytes`.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

// ============================================================================
// SECTION: Update Identifiers
// ============================================================================

/// Lays out a hex SHA-256 digest as a UUID (8-4-4-4-12 of the first 32 chars).
///
/// # Errors
///
/// Returns [`HashError::InvalidHexDigest`] when `digest` is not 64 hex chars.
pub fn uuid_from_sha256_hex(digest: &str) -> Result<String, HashError> {
    if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HashError::InvalidHexDigest(digest.to_string()));
    }
    let group = |start: usize, end: usize| digest.get(start .. end).unwrap_or_default();
    Ok(format!(
        "{}-{}-{}-{}-{}",
        group(0, 8),
        group(8, 12),
        group(12, 16),
        group(16, 20),
        group(20, 32)
    ))
}

/// Returns the update identifier derived from a bundle metadata document.
#[must_use]
pub fn update_id(metadata_bytes: &[u8]) -> String {
    let digest = Sha256::digest(metadata_bytes);
    format!(
        "{}-{}-{}-{}-{}",
        hex::encode(&digest[0 .. 4]),
        hex::encode(&digest[4 .. 6]),
        hex::encode(&digest[6 .. 8]),
        hex::encode(&digest[8 .. 10]),
        hex::encode(&digest[10 .. 16])
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests assert on known digests.")]

    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn asset_hash_is_unpadded_base64url() {
        let hash = sha256_base64url(b"abc");
        assert_eq!(hash, "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0");
        assert!(!hash.contains('='));
    }

    #[test]
    fn md5_hex_matches_known_vector() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn uuid_layout_uses_first_thirty_two_chars() {
        let uuid = uuid_from_sha256_hex(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        )
        .unwrap();
        assert_eq!(uuid, "ba7816bf-8f01-cfea-4141-40de5dae2223");
        assert_eq!(update_id(b"abc"), uuid);
    }

    #[test]
    fn uuid_rejects_short_digest() {
        assert!(uuid_from_sha256_hex("abc").is_err());
    }
}

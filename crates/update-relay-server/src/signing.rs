// crates/update-relay-server/src/signing.rs
// ============================================================================
// Module: Code Signing
// Description: RSA-SHA256 payload signatures as structured-field headers.
// Purpose: Let clients verify manifests and directives came from this server.
// Dependencies: base64, ring, rustls-pki-types, update-relay-core
// ============================================================================

//! ## Overview
//! The signing key is a PEM private key, PKCS#1 or PKCS#8, loaded once at
//! startup. Signatures cover the exact JSON bytes placed in the response part
//! and are rendered as `sig="<base64>"; keyid="main"`.
//! Security posture: key material is never logged or formatted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::rand::SystemRandom;
use ring::signature::RSA_PKCS1_SHA256;
use ring::signature::RsaKeyPair;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use thiserror::Error;
use update_relay_core::BareItem;
use update_relay_core::Dictionary;

use crate::error::ServiceError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Dictionary member carrying the signature.
pub const SIGNATURE_MEMBER: &str = "sig";
/// Dictionary member naming the key.
pub const KEY_ID_MEMBER: &str = "keyid";
/// Identifier of the only configured key.
pub const KEY_ID: &str = "main";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Signing key loading and signing failures.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Key file could not be read.
    #[error("failed to read signing key {path}: {message}")]
    Io {
        /// Key file path.
        path: String,
        /// Underlying error.
        message: String,
    },
    /// PEM block missing or malformed.
    #[error("invalid signing key PEM: {0}")]
    Pem(String),
    /// Key is not a usable RSA key.
    #[error("unsupported signing key: {0}")]
    Key(String),
    /// Signature computation or encoding failed.
    #[error("signing failed: {0}")]
    Sign(String),
}

impl From<SigningError> for ServiceError {
    fn from(err: SigningError) -> Self {
        Self::Backend(err.to_string())
    }
}

// ============================================================================
// SECTION: Signing Key
// ============================================================================

/// RSA private key used for code signing.
pub struct SigningKey {
    /// Parsed key pair.
    key_pair: RsaKeyPair,
    /// Randomness source required by the signing API.
    rng: SystemRandom,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").field("key_pair", &"<redacted>").finish()
    }
}

impl SigningKey {
    /// Parses a PEM-encoded PKCS#1 or PKCS#8 RSA private key.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Pem`] for malformed PEM and
    /// [`SigningError::Key`] for non-RSA or rejected keys.
    pub fn from_pem(pem: &[u8]) -> Result<Self, SigningError> {
        let der = PrivateKeyDer::from_pem_slice(pem)
            .map_err(|err| SigningError::Pem(err.to_string()))?;
        let key_pair = match &der {
            PrivateKeyDer::Pkcs1(key) => RsaKeyPair::from_der(key.secret_pkcs1_der()),
            PrivateKeyDer::Pkcs8(key) => RsaKeyPair::from_pkcs8(key.secret_pkcs8_der()),
            _ => return Err(SigningError::Key("expected an RSA private key".to_string())),
        }
        .map_err(|err| SigningError::Key(err.to_string()))?;
        Ok(Self {
            key_pair,
            rng: SystemRandom::new(),
        })
    }

    /// Reads and parses a PEM key file.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Io`] when the file cannot be read, otherwise
    /// the errors of [`SigningKey::from_pem`].
    pub fn load(path: &Path) -> Result<Self, SigningError> {
        let pem = std::fs::read(path).map_err(|err| SigningError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_pem(&pem)
    }

    /// Signs `payload` with RSASSA-PKCS1-v1_5 SHA-256 and returns base64.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Sign`] when the signature cannot be computed.
    pub fn sign(&self, payload: &[u8]) -> Result<String, SigningError> {
        let mut signature = vec![0_u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&RSA_PKCS1_SHA256, &self.rng, payload, &mut signature)
            .map_err(|err| SigningError::Sign(err.to_string()))?;
        Ok(STANDARD.encode(signature))
    }

    /// Signs `payload` and renders the `expo-signature` header value.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Sign`] when signing or serialization fails.
    pub fn signature_header(&self, payload: &[u8]) -> Result<String, SigningError> {
        let signature = self.sign(payload)?;
        let mut dictionary = Dictionary::new();
        dictionary.insert(SIGNATURE_MEMBER, BareItem::String(signature));
        dictionary.insert(KEY_ID_MEMBER, BareItem::String(KEY_ID.to_string()));
        dictionary.serialize().map_err(|err| SigningError::Sign(err.to_string()))
    }

    /// Returns the DER `RSAPublicKey` matching this key.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public().as_ref().to_vec()
    }
}

// ============================================================================
// SECTION: Code Signer
// ============================================================================

/// Optional signing key as seen by request handling.
#[derive(Debug, Default)]
pub struct CodeSigner {
    /// Configured key, if any.
    key: Option<SigningKey>,
}

impl CodeSigner {
    /// Creates a signer around an optional key.
    #[must_use]
    pub const fn new(key: Option<SigningKey>) -> Self {
        Self {
            key,
        }
    }

    /// Creates a signer without a key.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            key: None,
        }
    }

    /// Returns true when a key is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Returns the header value for `payload` when a signature is expected.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::SigningUnavailable`] when a signature is
    /// expected without a configured key, and [`ServiceError::Backend`] when
    /// signing fails.
    pub fn sign_if_expected(
        &self,
        expected: bool,
        payload: &[u8],
    ) -> Result<Option<String>, ServiceError> {
        if !expected {
            return Ok(None);
        }
        let key = self.key.as_ref().ok_or(ServiceError::SigningUnavailable)?;
        Ok(Some(key.signature_header(payload)?))
    }

    /// Fails fast when a signature is expected without a configured key.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::SigningUnavailable`] in that case.
    pub const fn ensure_available(&self, expected: bool) -> Result<(), ServiceError> {
        if expected && self.key.is_none() {
            Err(ServiceError::SigningUnavailable)
        } else {
            Ok(())
        }
    }
}

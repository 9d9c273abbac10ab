// crates/update-relay-server/tests/signing.rs
// ============================================================================
// Module: Code Signing Tests
// Description: Key loading, signature vectors, and signature headers.
// ============================================================================
//! ## Overview
//! RSASSA-PKCS1-v1_5 signatures are deterministic, so these tests pin exact
//! signature bytes for the fixture key in both PEM encodings.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::io::Write;

use update_relay_core::BareItem;
use update_relay_core::Dictionary;
use update_relay_server::CodeSigner;
use update_relay_server::ServiceError;
use update_relay_server::SigningError;
use update_relay_server::SigningKey;

use crate::common::PRIVATE_KEY_PEM;
use crate::common::PRIVATE_KEY_PKCS1_PEM;

/// Payload of the `noUpdateAvailable` directive.
const NO_UPDATE_PAYLOAD: &[u8] = br#"{"type":"noUpdateAvailable"}"#;
/// Base64 signature of [`NO_UPDATE_PAYLOAD`] under the fixture key.
const NO_UPDATE_SIGNATURE: &str = concat!(
    "C0J1nzHg5myoNO0Sn+P0cDIJSeCXYKeFIQvQg16JAyKMnOzKS8LqcwNXzPV3lXLX/1trIt1aVjbKzWDQ",
    "NlfkaRMErKSR7szXPnmzzbsZvm0jqzeNo8l0PfiECHgCXAWM+hgDbHHA852vD7iabAzbZtAXBijpA",
    "l3nSL39Gqxm3Hr1zgCtNoe4YnBisDMmnCxqWL9pxRb0Ml8+nnhXy3mIX2ACTU2dwwuxGbEZgLx9JT",
    "s3XcN3bmeCFj0B/rysuJnazVGRg6owvqYioF9sAWJglGWf1dTEl7wYDeUDxETQfL2YRDXLB/8Fh9H",
    "5M1M1s/o9NGY518Lux6m8PbiIrcIbhQ=="
);
/// Non-RSA key in SEC1 form.
const EC_KEY_PEM: &[u8] = include_bytes!("fixtures/ec-key.pem");

// ============================================================================
// SECTION: Key Loading
// ============================================================================

/// Tests PKCS#8 and PKCS#1 encodings of one key sign identically.
#[test]
fn test_pkcs8_and_pkcs1_keys_sign_identically() {
    let pkcs8 = SigningKey::from_pem(PRIVATE_KEY_PEM).unwrap();
    let pkcs1 = SigningKey::from_pem(PRIVATE_KEY_PKCS1_PEM).unwrap();
    assert_eq!(pkcs8.sign(NO_UPDATE_PAYLOAD).unwrap(), NO_UPDATE_SIGNATURE);
    assert_eq!(pkcs1.sign(NO_UPDATE_PAYLOAD).unwrap(), NO_UPDATE_SIGNATURE);
    assert_eq!(pkcs8.public_key_der(), pkcs1.public_key_der());
}

/// Tests input without a PEM block is rejected.
#[test]
fn test_garbage_pem_is_rejected() {
    let err = SigningKey::from_pem(b"not a key").unwrap_err();
    assert!(matches!(err, SigningError::Pem(_)));
}

/// Tests non-RSA keys are rejected.
#[test]
fn test_non_rsa_key_is_rejected() {
    let err = SigningKey::from_pem(EC_KEY_PEM).unwrap_err();
    assert!(matches!(err, SigningError::Key(_)));
}

/// Tests keys load from disk and missing files report the path.
#[test]
fn test_load_reads_key_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(PRIVATE_KEY_PEM).unwrap();
    let key = SigningKey::load(file.path()).unwrap();
    assert_eq!(key.sign(NO_UPDATE_PAYLOAD).unwrap(), NO_UPDATE_SIGNATURE);

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.pem");
    let err = SigningKey::load(&missing).unwrap_err();
    assert!(err.to_string().contains("absent.pem"));
}

/// Tests debug output never includes key material.
#[test]
fn test_debug_output_is_redacted() {
    let key = SigningKey::from_pem(PRIVATE_KEY_PEM).unwrap();
    assert!(format!("{key:?}").contains("<redacted>"));
}

// ============================================================================
// SECTION: Signature Header
// ============================================================================

/// Tests the header carries the signature with the `main` key id.
#[test]
fn test_signature_header_round_trips_through_sfv() {
    let key = SigningKey::from_pem(PRIVATE_KEY_PEM).unwrap();
    let header = key.signature_header(NO_UPDATE_PAYLOAD).unwrap();
    assert_eq!(header, format!("sig=\"{NO_UPDATE_SIGNATURE}\"; keyid=\"main\""));
    let parsed = Dictionary::parse(&header).unwrap();
    let sig = parsed.get("sig").unwrap();
    assert_eq!(sig.value.as_string(), Some(NO_UPDATE_SIGNATURE));
    assert_eq!(sig.param("keyid").and_then(BareItem::as_string), Some("main"));
}

// ============================================================================
// SECTION: Code Signer
// ============================================================================

/// Tests signing only happens when the client asks for it.
#[test]
fn test_signer_signs_only_when_expected() {
    let signer = CodeSigner::new(Some(common::signing_key()));
    assert!(signer.is_enabled());
    assert_eq!(signer.sign_if_expected(false, NO_UPDATE_PAYLOAD).unwrap(), None);
    let header = signer.sign_if_expected(true, NO_UPDATE_PAYLOAD).unwrap().unwrap();
    assert!(header.contains(NO_UPDATE_SIGNATURE));
    assert!(signer.ensure_available(true).is_ok());
}

/// Tests a disabled signer refuses expected signatures.
#[test]
fn test_disabled_signer_refuses_expected_signatures() {
    let signer = CodeSigner::disabled();
    assert!(!signer.is_enabled());
    assert_eq!(signer.sign_if_expected(false, NO_UPDATE_PAYLOAD).unwrap(), None);
    assert_eq!(
        signer.sign_if_expected(true, NO_UPDATE_PAYLOAD).unwrap_err(),
        ServiceError::SigningUnavailable
    );
    assert_eq!(signer.ensure_available(true), Err(ServiceError::SigningUnavailable));
    assert!(signer.ensure_available(false).is_ok());
}

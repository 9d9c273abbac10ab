// crates/update-relay-server/tests/update_flow.rs
// ============================================================================
// Module: Update Flow Tests
// Description: End-to-end manifest and directive responses from the service.
// ============================================================================
//! ## Overview
//! Drives [`UpdateService::handle`] through every protocol gate outcome and
//! inspects the multipart bodies it renders.

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

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::signature::RSA_PKCS1_2048_8192_SHA256;
use ring::signature::UnparsedPublicKey;
use update_relay_core::BareItem;
use update_relay_core::Dictionary;
use update_relay_core::Platform;
use update_relay_core::ProtocolVersion;
use update_relay_server::CodeSigner;
use update_relay_server::ManifestRequest;
use update_relay_server::ResponseKind;
use update_relay_server::ResponsePackage;
use update_relay_server::ServiceError;

use crate::common::IMAGE_KEY;
use crate::common::IOS_BUNDLE_KEY;
use crate::common::METADATA_ID;
use crate::common::PUBLISHED_AT_ISO;
use crate::common::ParsedPart;
use crate::common::runtime;

/// Bundle published by the rollback fixtures.
const ROLLBACK_TIMESTAMP: u64 = 1_714_570_000;
/// Embedded update id reported by rollback clients.
const EMBEDDED_ID: &str = "0f3a6c1e-5b1d-4c7a-9f2e-2d1b8c9e7a10";

/// Builds an iOS request for the fixture runtime version.
fn request(protocol: ProtocolVersion) -> ManifestRequest {
    ManifestRequest::new(protocol, Platform::Ios, runtime())
}

/// Splits a package body into parts.
fn parts(package: &ResponsePackage) -> Vec<ParsedPart> {
    common::parse_multipart(&package.body, package.boundary.as_str())
}

/// Returns a response header as text.
fn header<'a>(package: &'a ResponsePackage, name: &str) -> &'a str {
    package.headers.get(name).unwrap().to_str().unwrap()
}

// ============================================================================
// SECTION: Manifests
// ============================================================================

/// Tests protocol 0 always receives the manifest, even when current.
#[tokio::test]
async fn test_protocol_zero_serves_manifest_when_current() {
    let service = common::service(common::seeded_store(), CodeSigner::disabled());
    let package = service
        .handle(&request(ProtocolVersion::V0).with_current_update_id(METADATA_ID))
        .await
        .unwrap();
    assert_eq!(package.kind, ResponseKind::Manifest);
    assert_eq!(header(&package, "expo-protocol-version"), "0");
    assert_eq!(header(&package, "expo-sfv-version"), "0");
    assert_eq!(header(&package, "cache-control"), "private, max-age=0");
    assert_eq!(header(&package, "content-type"), package.boundary.content_type());

    let parts = parts(&package);
    assert_eq!(parts.len(), 2);
    assert_eq!(
        parts[0].header("content-disposition"),
        Some("form-data; name=\"manifest\"; filename=\"manifest\"")
    );
    assert_eq!(parts[0].header("content-type"), Some("application/json; charset=utf-8"));
    assert_eq!(parts[0].header("expo-signature"), None);
    let manifest = parts[0].json();
    assert_eq!(manifest["id"], METADATA_ID);
    assert_eq!(manifest["createdAt"], PUBLISHED_AT_ISO);
    assert_eq!(parts[1].header("content-type"), Some("application/json;charset=utf-8"));
}

/// Tests a client on an older update receives the manifest over protocol 1.
#[tokio::test]
async fn test_protocol_one_serves_manifest_when_outdated() {
    let service = common::service(common::seeded_store(), CodeSigner::disabled());
    let package = service
        .handle(
            &request(ProtocolVersion::V1)
                .with_current_update_id("00000000-0000-0000-0000-000000000000"),
        )
        .await
        .unwrap();
    assert_eq!(package.kind, ResponseKind::Manifest);
    assert_eq!(header(&package, "expo-protocol-version"), "1");
}

/// Tests the extensions part lists request headers for every asset.
#[tokio::test]
async fn test_extensions_cover_every_asset() {
    let service = common::service(common::seeded_store(), CodeSigner::disabled());
    let package = service.handle(&request(ProtocolVersion::V1)).await.unwrap();
    let extensions = parts(&package)[1].json();
    let headers = extensions["assetRequestHeaders"].as_object().unwrap();
    assert_eq!(headers.len(), 2);
    for key in [IMAGE_KEY, IOS_BUNDLE_KEY] {
        assert_eq!(headers[key], serde_json::json!({"test-header": "test-header-value"}));
    }
}

/// Tests a signed manifest verifies against the key's public half.
#[tokio::test]
async fn test_signed_manifest_verifies() {
    let key = common::signing_key();
    let public_key = key.public_key_der();
    let service = common::service(common::seeded_store(), CodeSigner::new(Some(key)));
    let package =
        service.handle(&request(ProtocolVersion::V1).expecting_signature()).await.unwrap();
    let manifest = &parts(&package)[0];
    let header = Dictionary::parse(manifest.header("expo-signature").unwrap()).unwrap();
    let sig = header.get("sig").unwrap();
    assert_eq!(sig.param("keyid").and_then(BareItem::as_string), Some("main"));
    let signature = STANDARD.decode(sig.value.as_string().unwrap()).unwrap();
    UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, public_key)
        .verify(manifest.body.as_bytes(), &signature)
        .unwrap();
}

/// Tests signature requests fail before any asset is read without a key.
#[tokio::test]
async fn test_signature_without_key_is_rejected() {
    let store = common::seeded_store();
    let service = common::service(store.clone(), CodeSigner::disabled());
    let err =
        service.handle(&request(ProtocolVersion::V1).expecting_signature()).await.unwrap_err();
    assert_eq!(err, ServiceError::SigningUnavailable);
    assert_eq!(store.calls().get, 1);
    assert_eq!(
        err.to_string(),
        "Code signing requested but no key supplied when starting server."
    );
}

/// Tests a platform without exported files is not found.
#[tokio::test]
async fn test_platform_missing_from_bundle_is_not_found() {
    let store = std::sync::Arc::new(update_relay_storage::InMemoryBlobStore::new());
    let at = common::published_at();
    store.insert(
        "updates/1.0.0/1714560000/metadata.json",
        r#"{"fileMetadata":{"android":{"bundle":"b.js"}}}"#,
        at,
    );
    let service = common::service(store, CodeSigner::disabled());
    let err = service.handle(&request(ProtocolVersion::V1)).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

// ============================================================================
// SECTION: No Update Available
// ============================================================================

/// Tests a current client on protocol 1 receives `noUpdateAvailable`.
#[tokio::test]
async fn test_current_client_gets_no_update_directive() {
    let service = common::service(common::seeded_store(), CodeSigner::disabled());
    let package = service
        .handle(&request(ProtocolVersion::V1).with_current_update_id(METADATA_ID))
        .await
        .unwrap();
    assert_eq!(package.kind, ResponseKind::NoUpdateAvailable);
    assert_eq!(header(&package, "expo-protocol-version"), "1");
    let parts = parts(&package);
    assert_eq!(parts.len(), 1);
    assert_eq!(
        parts[0].header("content-disposition"),
        Some("form-data; name=\"directive\"; filename=\"directive.json\"")
    );
    assert_eq!(parts[0].body, r#"{"type":"noUpdateAvailable"}"#);
}

/// Tests the signed `noUpdateAvailable` directive carries the known signature.
#[tokio::test]
async fn test_no_update_directive_signature_is_deterministic() {
    let service =
        common::service(common::seeded_store(), CodeSigner::new(Some(common::signing_key())));
    let request =
        request(ProtocolVersion::V1).with_current_update_id(METADATA_ID).expecting_signature();
    let package = service.handle(&request).await.unwrap();
    let directive = &parts(&package)[0];
    let header = Dictionary::parse(directive.header("expo-signature").unwrap()).unwrap();
    let expected = concat!(
        "C0J1nzHg5myoNO0Sn+P0cDIJSeCXYKeFIQvQg16JAyKMnOzKS8LqcwNXzPV3lXLX/1trIt1aVjbKzWDQ",
        "NlfkaRMErKSR7szXPnmzzbsZvm0jqzeNo8l0PfiECHgCXAWM+hgDbHHA852vD7iabAzbZtAXBijpA",
        "l3nSL39Gqxm3Hr1zgCtNoe4YnBisDMmnCxqWL9pxRb0Ml8+nnhXy3mIX2ACTU2dwwuxGbEZgLx9JT",
        "s3XcN3bmeCFj0B/rysuJnazVGRg6owvqYioF9sAWJglGWf1dTEl7wYDeUDxETQfL2YRDXLB/8Fh9H",
        "5M1M1s/o9NGY518Lux6m8PbiIrcIbhQ=="
    );
    assert_eq!(header.get("sig").unwrap().value.as_string(), Some(expected));
}

// ============================================================================
// SECTION: Rollbacks
// ============================================================================

/// Tests a rollback bundle produces `rollBackToEmbedded` with its commit time.
#[tokio::test]
async fn test_rollback_directive_carries_commit_time() {
    let store = common::seeded_store();
    common::publish_rollback(&store, common::RUNTIME, ROLLBACK_TIMESTAMP);
    let service = common::service(store, CodeSigner::disabled());
    let package = service
        .handle(&request(ProtocolVersion::V1).with_embedded_update_id(EMBEDDED_ID))
        .await
        .unwrap();
    assert_eq!(package.kind, ResponseKind::RollBackToEmbedded);
    let parts = parts(&package);
    assert_eq!(
        parts[0].header("content-disposition"),
        Some("form-data; name=\"directive\"; filename=\"directive\"")
    );
    assert_eq!(
        parts[0].json(),
        serde_json::json!({
            "type": "rollBackToEmbedded",
            "parameters": {"commitTime": PUBLISHED_AT_ISO}
        })
    );
}

/// Tests a client already on its embedded update gets `noUpdateAvailable`.
#[tokio::test]
async fn test_rollback_already_applied_is_no_update() {
    let store = common::seeded_store();
    common::publish_rollback(&store, common::RUNTIME, ROLLBACK_TIMESTAMP);
    let service = common::service(store, CodeSigner::disabled());
    let package = service
        .handle(
            &request(ProtocolVersion::V1)
                .with_embedded_update_id(EMBEDDED_ID)
                .with_current_update_id(EMBEDDED_ID),
        )
        .await
        .unwrap();
    assert_eq!(package.kind, ResponseKind::NoUpdateAvailable);
}

/// Tests rollbacks are refused on protocol 0.
#[tokio::test]
async fn test_rollback_on_protocol_zero_is_unsupported() {
    let store = common::seeded_store();
    common::publish_rollback(&store, common::RUNTIME, ROLLBACK_TIMESTAMP);
    let service = common::service(store, CodeSigner::disabled());
    let err = service.handle(&request(ProtocolVersion::V0)).await.unwrap_err();
    assert_eq!(
        err,
        ServiceError::ProtocolUnsupported(
            "Rollbacks not supported on protocol version 0".to_string()
        )
    );
}

/// Tests rollbacks require the embedded update id.
#[tokio::test]
async fn test_rollback_without_embedded_id_is_rejected() {
    let store = common::seeded_store();
    common::publish_rollback(&store, common::RUNTIME, ROLLBACK_TIMESTAMP);
    let service = common::service(store, CodeSigner::disabled());
    let err = service.handle(&request(ProtocolVersion::V1)).await.unwrap_err();
    assert_eq!(
        err,
        ServiceError::ProtocolUnsupported(
            "Invalid Expo-Embedded-Update-ID request header specified.".to_string()
        )
    );
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Tests resolution reports the bundle, its type, and the manifest id.
#[tokio::test]
async fn test_resolve_reports_latest_bundle() {
    let service = common::service(common::seeded_store(), CodeSigner::disabled());
    let resolution = service.resolve(&runtime(), Platform::Android).await.unwrap();
    assert_eq!(resolution.bundle.as_str(), "updates/1.0.0/1714560000");
    assert_eq!(resolution.update_type, update_relay_core::UpdateType::Normal);
    assert_eq!(resolution.update_id.as_deref(), Some(METADATA_ID));
}

/// Tests an unpublished runtime version is not found.
#[tokio::test]
async fn test_unknown_runtime_version_is_not_found() {
    let service = common::service(common::seeded_store(), CodeSigner::disabled());
    let request = ManifestRequest::new(
        ProtocolVersion::V1,
        Platform::Ios,
        update_relay_core::RuntimeVersion::parse("2.0.0").unwrap(),
    );
    let err = service.handle(&request).await.unwrap_err();
    assert_eq!(
        err,
        ServiceError::NotFound("No updates found for runtime version 2.0.0".to_string())
    );
}

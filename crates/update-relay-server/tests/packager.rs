// crates/update-relay-server/tests/packager.rs
// ============================================================================
// Module: Response Packager Tests
// Description: Multipart framing and response headers.
// ============================================================================
//! ## Overview
//! Checks the exact bytes of rendered packages: part order, part headers,
//! signature placement, and the closing delimiter.

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

use std::collections::BTreeMap;

use update_relay_core::AssetMetadata;
use update_relay_core::Directive;
use update_relay_core::Manifest;
use update_relay_core::ManifestExtra;
use update_relay_core::ProtocolVersion;
use update_relay_server::ResponseKind;
use update_relay_server::packager;
use update_relay_server::packager::DirectiveFilename;

/// Builds an asset with the given key.
fn asset(key: &str) -> AssetMetadata {
    AssetMetadata {
        hash: format!("hash-{key}"),
        key: key.to_string(),
        file_extension: ".png".to_string(),
        content_type: "image/png".to_string(),
        url: format!("https://updates.example.com/{key}"),
    }
}

/// Builds a manifest with two assets and a launch asset.
fn manifest() -> Manifest {
    Manifest {
        id: "id".to_string(),
        created_at: "2024-05-01T12:00:00.000Z".to_string(),
        runtime_version: "1.0.0".to_string(),
        assets: vec![asset("a"), asset("b")],
        launch_asset: asset("launch"),
        metadata: BTreeMap::new(),
        extra: ManifestExtra {
            app_config: serde_json::json!({}),
        },
    }
}

// ============================================================================
// SECTION: Manifest Packages
// ============================================================================

/// Tests the manifest package byte layout.
#[test]
fn test_manifest_package_layout() {
    let extensions = serde_json::json!({"assetRequestHeaders": {}});
    let signature = Some("sig=\"x\"");
    let package =
        packager::package_manifest(b"{}".to_vec(), &extensions, signature, ProtocolVersion::V1)
            .unwrap();
    let boundary = package.boundary.as_str();
    let expected = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"manifest\"; filename=\"manifest\"\r\n\
         Content-Type: application/json; charset=utf-8\r\n\
         expo-signature: sig=\"x\"\r\n\
         \r\n\
         {{}}\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"extensions\"; filename=\"extensions\"\r\n\
         Content-Type: application/json;charset=utf-8\r\n\
         \r\n\
         {{\"assetRequestHeaders\":{{}}}}\r\n\
         --{boundary}--\r\n"
    );
    assert_eq!(String::from_utf8(package.body.clone()).unwrap(), expected);
    assert_eq!(package.kind, ResponseKind::Manifest);
    assert_eq!(package.headers["expo-protocol-version"], "1");
    assert_eq!(package.headers["content-type"], format!("multipart/mixed; boundary={boundary}"));
}

/// Tests each package gets a fresh boundary.
#[test]
fn test_boundaries_differ_between_packages() {
    let extensions = serde_json::json!({});
    let first =
        packager::package_manifest(b"{}".to_vec(), &extensions, None, ProtocolVersion::V0).unwrap();
    let second =
        packager::package_manifest(b"{}".to_vec(), &extensions, None, ProtocolVersion::V0).unwrap();
    assert_ne!(first.boundary, second.boundary);
    assert_eq!(first.headers["expo-protocol-version"], "0");
}

/// Tests the extensions document covers the launch asset too.
#[test]
fn test_asset_request_headers_cover_launch_asset() {
    let mut headers = BTreeMap::new();
    headers.insert("authorization".to_string(), "Bearer t".to_string());
    let extensions = packager::asset_request_headers(&manifest(), &headers);
    assert_eq!(
        extensions,
        serde_json::json!({
            "assetRequestHeaders": {
                "a": {"authorization": "Bearer t"},
                "b": {"authorization": "Bearer t"},
                "launch": {"authorization": "Bearer t"}
            }
        })
    );
}

/// Tests manifests serialize to the bytes that get signed.
#[test]
fn test_payload_bytes_are_compact_json() {
    let bytes = packager::payload_bytes(&Directive::NoUpdateAvailable).unwrap();
    assert_eq!(bytes, br#"{"type":"noUpdateAvailable"}"#);
}

// ============================================================================
// SECTION: Directive Packages
// ============================================================================

/// Tests directive filenames differ by directive type.
#[test]
fn test_directive_filenames() {
    let rollback = Directive::roll_back_to_embedded("2024-05-01T12:00:00.000Z");
    assert_eq!(DirectiveFilename::for_directive(&rollback).as_str(), "directive");
    assert_eq!(
        DirectiveFilename::for_directive(&Directive::NoUpdateAvailable).as_str(),
        "directive.json"
    );
}

/// Tests directive packages always advertise protocol 1.
#[test]
fn test_directive_package_uses_protocol_one() {
    let rollback = Directive::roll_back_to_embedded("2024-05-01T12:00:00.000Z");
    let json = packager::payload_bytes(&rollback).unwrap();
    let package = packager::package_directive(&rollback, json, None).unwrap();
    assert_eq!(package.kind, ResponseKind::RollBackToEmbedded);
    assert_eq!(package.headers["expo-protocol-version"], "1");
    assert_eq!(package.headers["expo-sfv-version"], "0");
    assert_eq!(package.headers["cache-control"], "private, max-age=0");
    let parts = common::parse_multipart(&package.body, package.boundary.as_str());
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].header("expo-signature"), None);
    assert_eq!(
        parts[0].body,
        r#"{"type":"rollBackToEmbedded","parameters":{"commitTime":"2024-05-01T12:00:00.000Z"}}"#
    );
}

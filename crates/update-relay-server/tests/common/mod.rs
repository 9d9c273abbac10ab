// crates/update-relay-server/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Published bundle fixtures and multipart helpers.
// Purpose: Share deterministic storage layouts across server tests.
// Dependencies: update-relay-core, update-relay-server, update-relay-storage
// ============================================================================

//! ## Overview
//! Publishes bundles into an [`InMemoryBlobStore`] exactly as the export step
//! lays them out, and splits multipart bodies back into parts for assertions.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use update_relay_core::Logger;
use update_relay_core::RuntimeVersion;
use update_relay_server::CodeSigner;
use update_relay_server::MetadataCache;
use update_relay_server::ServiceOptions;
use update_relay_server::SigningKey;
use update_relay_server::UpdateService;
use update_relay_storage::BlobObject;
use update_relay_storage::BlobStore;
use update_relay_storage::BlobStoreError;
use update_relay_storage::InMemoryBlobStore;
use update_relay_storage::ListPage;
use update_relay_storage::ListRequest;
use update_relay_storage::ObjectMetadata;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Runtime version used by most fixtures.
pub const RUNTIME: &str = "1.0.0";
/// Public host prefixed to asset URLs.
pub const PUBLIC_HOST: &str = "https://updates.example.com";
/// Exported bundle descriptor.
pub const METADATA: &str = concat!(
    r#"{"fileMetadata":{"#,
    r#""ios":{"bundle":"bundles/ios-4b7c.js","assets":[{"path":"assets/4f1cb2e8","ext":"png"}]},"#,
    r#""android":{"bundle":"bundles/android-9e2d.js","assets":[]}}}"#
);
/// Update id derived from [`METADATA`].
pub const METADATA_ID: &str = "4d459712-72eb-5be6-37dd-a063df6b94ca";
/// Exported app configuration.
pub const APP_CONFIG: &str = r#"{"name":"relay-demo","slug":"relay-demo","version":"1.0.0"}"#;
/// Image asset bytes.
pub const IMAGE: &[u8] = b"\x89PNG fake image bytes";
/// Base64url SHA-256 of [`IMAGE`].
pub const IMAGE_HASH: &str = "wgK20wmtyCvf4sezegEGTxa9n-9fTUf45psokoubqkY";
/// Hex MD5 of [`IMAGE`].
pub const IMAGE_KEY: &str = "901fff91535a3043b32549cd6bff481b";
/// iOS launch bundle bytes.
pub const IOS_BUNDLE: &str = "console.log('ios');";
/// Base64url SHA-256 of [`IOS_BUNDLE`].
pub const IOS_BUNDLE_HASH: &str = "oGVMzItfSrhS62lyrNCk6mva8hABRMWRGDLvHhEU-GA";
/// Hex MD5 of [`IOS_BUNDLE`].
pub const IOS_BUNDLE_KEY: &str = "ef9f1ee685d41a2482816a2d92cf088c";
/// Android launch bundle bytes.
pub const ANDROID_BUNDLE: &str = "console.log('android');";
/// Modification time of every fixture object.
pub const PUBLISHED_AT_SECS: u64 = 1_714_564_800;
/// [`PUBLISHED_AT_SECS`] rendered as ISO-8601.
pub const PUBLISHED_AT_ISO: &str = "2024-05-01T12:00:00.000Z";
/// PKCS#8 signing key.
pub const PRIVATE_KEY_PEM: &[u8] = include_bytes!("../fixtures/private-key.pem");
/// The same key in PKCS#1 form.
pub const PRIVATE_KEY_PKCS1_PEM: &[u8] = include_bytes!("../fixtures/private-key-pkcs1.pem");

/// Returns the fixture modification time.
pub fn published_at() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(PUBLISHED_AT_SECS)
}

/// Returns the fixture runtime version.
pub fn runtime() -> RuntimeVersion {
    RuntimeVersion::parse(RUNTIME).unwrap()
}

/// Publishes a normal bundle under `updates/<runtime>/<timestamp>/`.
pub fn publish_bundle(store: &InMemoryBlobStore, runtime: &str, timestamp: u64) {
    let dir = format!("updates/{runtime}/{timestamp}");
    let at = published_at();
    store.insert(format!("{dir}/metadata.json"), METADATA, at);
    store.insert(format!("{dir}/expoConfig.json"), APP_CONFIG, at);
    store.insert(format!("{dir}/assets/4f1cb2e8"), IMAGE, at);
    store.insert(format!("{dir}/bundles/ios-4b7c.js"), IOS_BUNDLE, at);
    store.insert(format!("{dir}/bundles/android-9e2d.js"), ANDROID_BUNDLE, at);
}

/// Publishes a rollback bundle under `updates/<runtime>/<timestamp>/`.
pub fn publish_rollback(store: &InMemoryBlobStore, runtime: &str, timestamp: u64) {
    store.insert(format!("updates/{runtime}/{timestamp}/rollback"), "", published_at());
}

/// Returns a store with one normal bundle for [`RUNTIME`].
pub fn seeded_store() -> Arc<InMemoryBlobStore> {
    let store = Arc::new(InMemoryBlobStore::new());
    publish_bundle(&store, RUNTIME, 1_714_560_000);
    store
}

/// Returns the fixture signing key.
pub fn signing_key() -> SigningKey {
    SigningKey::from_pem(PRIVATE_KEY_PEM).unwrap()
}

/// Returns service options with one fixed asset request header.
pub fn options() -> ServiceOptions {
    let mut options = ServiceOptions::public_host(PUBLIC_HOST);
    options
        .asset_request_headers
        .insert("test-header".to_string(), "test-header-value".to_string());
    options
}

/// Wires a service over `store`.
pub fn service(store: Arc<InMemoryBlobStore>, signer: CodeSigner) -> UpdateService {
    UpdateService::new(
        store,
        Arc::new(MetadataCache::default()),
        signer,
        options(),
        Logger::noop(),
    )
}

// ============================================================================
// SECTION: Stores
// ============================================================================

/// Store that serves one body for every key and never reports a
/// modification time.
pub struct MissingTimestamps {
    /// Body returned by every `get`.
    body: Bytes,
}

impl MissingTimestamps {
    /// Serves `body` for every key.
    pub fn new(body: &'static str) -> Self {
        Self {
            body: Bytes::from_static(body.as_bytes()),
        }
    }
}

#[async_trait]
impl BlobStore for MissingTimestamps {
    fn provider(&self) -> &'static str {
        "missing-timestamps"
    }

    async fn list(&self, _request: &ListRequest) -> Result<ListPage, BlobStoreError> {
        Ok(ListPage::default())
    }

    async fn get(&self, _key: &str, _max_bytes: usize) -> Result<BlobObject, BlobStoreError> {
        Ok(BlobObject {
            body: self.body.clone(),
            metadata: ObjectMetadata::default(),
        })
    }

    async fn put(
        &self,
        key: &str,
        _body: Bytes,
        _content_type: Option<&str>,
    ) -> Result<(), BlobStoreError> {
        Err(BlobStoreError::Unsupported(format!("read-only store: {key}")))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        Err(BlobStoreError::Unsupported(format!("read-only store: {key}")))
    }

    async fn head(&self, _key: &str) -> Result<ObjectMetadata, BlobStoreError> {
        Ok(ObjectMetadata::default())
    }
}

// ============================================================================
// SECTION: Multipart
// ============================================================================

/// One parsed multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPart {
    /// Header lines in order.
    pub headers: Vec<String>,
    /// Body text.
    pub body: String,
}

impl ParsedPart {
    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (key, value) = line.split_once(": ")?;
            key.eq_ignore_ascii_case(name).then_some(value)
        })
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Splits a multipart body, asserting the closing delimiter.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Vec<ParsedPart> {
    let text = std::str::from_utf8(body).unwrap();
    let closing = format!("--{boundary}--\r\n");
    let delimiter = format!("--{boundary}");
    let content = text.strip_suffix(closing.as_str()).expect("closing delimiter");
    content
        .split(delimiter.as_str())
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let chunk = chunk.strip_prefix("\r\n").expect("delimiter line ending");
            let chunk = chunk.strip_suffix("\r\n").expect("body line ending");
            let (headers, body) = chunk.split_once("\r\n\r\n").expect("header block");
            ParsedPart {
                headers: headers.split("\r\n").map(str::to_string).collect(),
                body: body.to_string(),
            }
        })
        .collect()
}

/// Extracts the boundary from a `multipart/mixed` content type.
pub fn boundary_of(content_type: &str) -> String {
    content_type
        .strip_prefix("multipart/mixed; boundary=")
        .expect("multipart content type")
        .to_string()
}

// crates/update-relay-server/src/packager.rs
// ============================================================================
// Module: Response Packager
// Description: Multipart framing and response headers for update responses.
// Purpose: Render manifests and directives in the update protocol's layout.
// Dependencies: axum, serde_json, update-relay-core
// ============================================================================

//! ## Overview
//! Manifest responses carry a `manifest` part followed by an `extensions`
//! part listing per-asset request headers. Directive responses carry a single
//! `directive` part. A signature, when present, is an `expo-signature` header
//! inside the JSON part. The JSON bytes that were signed are the bytes placed
//! in the part body.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::header;
use serde_json::Map;
use serde_json::Value;
use update_relay_core::Boundary;
use update_relay_core::Directive;
use update_relay_core::Manifest;
use update_relay_core::MultipartBuilder;
use update_relay_core::Part;
use update_relay_core::ProtocolVersion;

use crate::error::ServiceError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Content type of the manifest and directive parts.
pub const JSON_PART_CONTENT_TYPE: &str = "application/json; charset=utf-8";
/// Content type of the extensions part.
pub const EXTENSIONS_CONTENT_TYPE: &str = "application/json;charset=utf-8";
/// Part header carrying the signature.
pub const SIGNATURE_HEADER: &str = "expo-signature";
/// Response header echoing the protocol version.
pub const PROTOCOL_VERSION_HEADER: &str = "expo-protocol-version";
/// Response header naming the structured-field version.
pub const SFV_VERSION_HEADER: &str = "expo-sfv-version";
/// Cache policy for every update response.
pub const CACHE_CONTROL: &str = "private, max-age=0";

// ============================================================================
// SECTION: Directive Kinds
// ============================================================================

/// Directive part filename variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveFilename {
    /// `filename="directive"`, used for rollbacks.
    Directive,
    /// `filename="directive.json"`, used for `noUpdateAvailable`.
    DirectiveJson,
}

impl DirectiveFilename {
    /// Returns the filename written in the part header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Directive => "directive",
            Self::DirectiveJson => "directive.json",
        }
    }

    /// Returns the filename used for `directive`.
    #[must_use]
    pub const fn for_directive(directive: &Directive) -> Self {
        match directive {
            Directive::RollBackToEmbedded {
                ..
            } => Self::Directive,
            Directive::NoUpdateAvailable => Self::DirectiveJson,
        }
    }
}

/// What an update response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Update manifest with extensions.
    Manifest,
    /// `rollBackToEmbedded` directive.
    RollBackToEmbedded,
    /// `noUpdateAvailable` directive.
    NoUpdateAvailable,
}

impl ResponseKind {
    /// Returns the label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manifest => "manifest",
            Self::RollBackToEmbedded => "rollBackToEmbedded",
            Self::NoUpdateAvailable => "noUpdateAvailable",
        }
    }
}

// ============================================================================
// SECTION: Package
// ============================================================================

/// Fully rendered update response.
#[derive(Debug, Clone)]
pub struct ResponsePackage {
    /// Payload carried by the response.
    pub kind: ResponseKind,
    /// Response headers.
    pub headers: HeaderMap,
    /// Multipart body.
    pub body: Vec<u8>,
    /// Boundary used in the body.
    pub boundary: Boundary,
}

/// Serializes a payload into the exact bytes placed on the wire.
///
/// # Errors
///
/// Returns [`ServiceError::Backend`] when serialization fails.
pub fn payload_bytes<T: serde::Serialize>(payload: &T) -> Result<Vec<u8>, ServiceError> {
    serde_json::to_vec(payload)
        .map_err(|err| ServiceError::Backend(format!("payload serialization failed: {err}")))
}

/// Builds the extensions document mapping each asset key to its headers.
#[must_use]
pub fn asset_request_headers(manifest: &Manifest, headers: &BTreeMap<String, String>) -> Value {
    let per_asset: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();
    let mut by_key = Map::new();
    for asset in manifest.all_assets() {
        by_key.insert(asset.key.clone(), Value::Object(per_asset.clone()));
    }
    let mut extensions = Map::new();
    extensions.insert("assetRequestHeaders".to_string(), Value::Object(by_key));
    Value::Object(extensions)
}

/// Renders a manifest response from pre-serialized manifest bytes.
///
/// # Errors
///
/// Returns [`ServiceError::Backend`] when a header value is not representable.
pub fn package_manifest(
    manifest_json: Vec<u8>,
    extensions: &Value,
    signature: Option<&str>,
    protocol: ProtocolVersion,
) -> Result<ResponsePackage, ServiceError> {
    let boundary = Boundary::random();
    let mut builder = MultipartBuilder::new(boundary.clone());
    builder.push(json_part("manifest", "manifest", manifest_json, signature));
    builder.push(Part::new(
        "extensions",
        "extensions",
        EXTENSIONS_CONTENT_TYPE,
        payload_bytes(extensions)?,
    ));
    let headers = response_headers(&boundary, protocol.as_u8())?;
    Ok(ResponsePackage {
        kind: ResponseKind::Manifest,
        headers,
        body: builder.finish(),
        boundary,
    })
}

/// Renders a directive response from the directive's pre-serialized bytes.
///
/// # Errors
///
/// Returns [`ServiceError::Backend`] when a header value is not representable.
pub fn package_directive(
    directive: &Directive,
    directive_json: Vec<u8>,
    signature: Option<&str>,
) -> Result<ResponsePackage, ServiceError> {
    let filename = DirectiveFilename::for_directive(directive);
    let kind = match directive {
        Directive::RollBackToEmbedded {
            ..
        } => ResponseKind::RollBackToEmbedded,
        Directive::NoUpdateAvailable => ResponseKind::NoUpdateAvailable,
    };
    let boundary = Boundary::random();
    let mut builder = MultipartBuilder::new(boundary.clone());
    builder.push(json_part("directive", filename.as_str(), directive_json, signature));
    let headers = response_headers(&boundary, ProtocolVersion::V1.as_u8())?;
    Ok(ResponsePackage {
        kind,
        headers,
        body: builder.finish(),
        boundary,
    })
}

/// Builds a JSON part with an optional signature header.
fn json_part(name: &str, filename: &str, body: Vec<u8>, signature: Option<&str>) -> Part {
    let part = Part::new(name, filename, JSON_PART_CONTENT_TYPE, body);
    match signature {
        Some(value) => part.with_header(SIGNATURE_HEADER, value),
        None => part,
    }
}

/// Builds the response headers shared by every update response.
fn response_headers(boundary: &Boundary, protocol: u8) -> Result<HeaderMap, ServiceError> {
    let content_type = HeaderValue::from_str(&boundary.content_type())
        .map_err(|err| ServiceError::Backend(format!("invalid boundary header: {err}")))?;
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(PROTOCOL_VERSION_HEADER),
        HeaderValue::from(u16::from(protocol)),
    );
    headers.insert(HeaderName::from_static(SFV_VERSION_HEADER), HeaderValue::from_static("0"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    headers.insert(header::CONTENT_TYPE, content_type);
    Ok(headers)
}

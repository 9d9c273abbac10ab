// crates/update-relay-server/src/request.rs
// ============================================================================
// Module: Manifest Request
// Description: Validation of manifest request headers and query parameters.
// Purpose: Turn raw HTTP inputs into a typed, validated request.
// Dependencies: axum, update-relay-core
// ============================================================================

//! ## Overview
//! Header names are case-insensitive. Platform and runtime version fall back
//! to the `platform` and `runtime-version` query parameters. A repeated
//! `expo-protocol-version` header is rejected, as is any value other than
//! `0` or `1`. A non-empty `expo-expect-signature` header must be a
//! structured-field dictionary. Validation never touches storage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use axum::http::HeaderMap;
use update_relay_core::Dictionary;
use update_relay_core::Platform;
use update_relay_core::ProtocolVersion;
use update_relay_core::RuntimeVersion;

use crate::error::ServiceError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Negotiated protocol version header.
pub const PROTOCOL_VERSION_HEADER: &str = "expo-protocol-version";
/// Client platform header.
pub const PLATFORM_HEADER: &str = "expo-platform";
/// Client runtime version header.
pub const RUNTIME_VERSION_HEADER: &str = "expo-runtime-version";
/// Running update id header.
pub const CURRENT_UPDATE_ID_HEADER: &str = "expo-current-update-id";
/// Embedded update id header.
pub const EMBEDDED_UPDATE_ID_HEADER: &str = "expo-embedded-update-id";
/// Signature expectation header.
pub const EXPECT_SIGNATURE_HEADER: &str = "expo-expect-signature";
/// Platform query fallback.
pub const PLATFORM_QUERY: &str = "platform";
/// Runtime version query fallback.
pub const RUNTIME_VERSION_QUERY: &str = "runtime-version";

/// Message for unusable protocol versions.
pub const UNSUPPORTED_PROTOCOL_MESSAGE: &str =
    "Unsupported protocol version. Expected either 0 or 1.";
/// Message for unusable platforms.
pub const UNSUPPORTED_PLATFORM_MESSAGE: &str =
    "Unsupported platform. Expected either ios or android.";
/// Message for a missing runtime version.
pub const MISSING_RUNTIME_VERSION_MESSAGE: &str = "No runtimeVersion provided.";

// ============================================================================
// SECTION: Request
// ============================================================================

/// Validated manifest request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRequest {
    /// Negotiated protocol version.
    pub protocol: ProtocolVersion,
    /// Client platform.
    pub platform: Platform,
    /// Client runtime version.
    pub runtime_version: RuntimeVersion,
    /// Update currently running on the client.
    pub current_update_id: Option<String>,
    /// Update embedded in the client binary.
    pub embedded_update_id: Option<String>,
    /// True when the client expects signed payloads.
    pub expect_signature: bool,
}

impl ManifestRequest {
    /// Creates a request for the given platform and runtime version.
    #[must_use]
    pub const fn new(
        protocol: ProtocolVersion,
        platform: Platform,
        runtime_version: RuntimeVersion,
    ) -> Self {
        Self {
            protocol,
            platform,
            runtime_version,
            current_update_id: None,
            embedded_update_id: None,
            expect_signature: false,
        }
    }

    /// Sets the running update id.
    #[must_use]
    pub fn with_current_update_id(mut self, id: impl Into<String>) -> Self {
        self.current_update_id = Some(id.into());
        self
    }

    /// Sets the embedded update id.
    #[must_use]
    pub fn with_embedded_update_id(mut self, id: impl Into<String>) -> Self {
        self.embedded_update_id = Some(id.into());
        self
    }

    /// Marks the request as expecting a signature.
    #[must_use]
    pub const fn expecting_signature(mut self) -> Self {
        self.expect_signature = true;
        self
    }

    /// Validates request headers and query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for a repeated or unsupported
    /// protocol version, an unsupported platform, a missing or unusable
    /// runtime version, or a malformed signature expectation.
    pub fn from_parts(
        headers: &HeaderMap,
        query: &HashMap<String, String>,
    ) -> Result<Self, ServiceError> {
        let protocol = parse_protocol(headers)?;
        let platform = header_or_query(headers, PLATFORM_HEADER, query, PLATFORM_QUERY)?
            .ok_or_else(|| ServiceError::Validation(UNSUPPORTED_PLATFORM_MESSAGE.to_string()))?
            .parse::<Platform>()
            .map_err(|_| ServiceError::Validation(UNSUPPORTED_PLATFORM_MESSAGE.to_string()))?;
        let runtime_version =
            header_or_query(headers, RUNTIME_VERSION_HEADER, query, RUNTIME_VERSION_QUERY)?
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    ServiceError::Validation(MISSING_RUNTIME_VERSION_MESSAGE.to_string())
                })?;
        let runtime_version = RuntimeVersion::parse(&runtime_version)
            .map_err(|err| ServiceError::Validation(err.to_string()))?;
        Ok(Self {
            protocol,
            platform,
            runtime_version,
            current_update_id: header(headers, CURRENT_UPDATE_ID_HEADER)?,
            embedded_update_id: header(headers, EMBEDDED_UPDATE_ID_HEADER)?,
            expect_signature: parse_expect_signature(headers)?,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses the protocol version, defaulting to 0 when absent.
fn parse_protocol(headers: &HeaderMap) -> Result<ProtocolVersion, ServiceError> {
    let mut values = headers.get_all(PROTOCOL_VERSION_HEADER).iter();
    let Some(first) = values.next() else {
        return Ok(ProtocolVersion::V0);
    };
    let unsupported = || ServiceError::Validation(UNSUPPORTED_PROTOCOL_MESSAGE.to_string());
    if values.next().is_some() {
        return Err(unsupported());
    }
    let value = first.to_str().map_err(|_| unsupported())?;
    value.parse::<ProtocolVersion>().map_err(|_| unsupported())
}

/// Returns true when a well-formed signature expectation is present.
fn parse_expect_signature(headers: &HeaderMap) -> Result<bool, ServiceError> {
    let Some(value) = header(headers, EXPECT_SIGNATURE_HEADER)? else {
        return Ok(false);
    };
    if value.trim().is_empty() {
        return Ok(false);
    }
    Dictionary::parse(&value).map_err(|err| {
        ServiceError::Validation(format!("Invalid {EXPECT_SIGNATURE_HEADER} header: {err}"))
    })?;
    Ok(true)
}

/// Returns a single header value as text.
fn header(headers: &HeaderMap, name: &str) -> Result<Option<String>, ServiceError> {
    headers
        .get(name)
        .map(|value| {
            value.to_str().map(str::to_string).map_err(|_| {
                ServiceError::Validation(format!("Header {name} is not valid visible ASCII."))
            })
        })
        .transpose()
}

/// Returns a header value, falling back to a query parameter.
fn header_or_query(
    headers: &HeaderMap,
    name: &str,
    query: &HashMap<String, String>,
    param: &str,
) -> Result<Option<String>, ServiceError> {
    match header(headers, name)? {
        Some(value) => Ok(Some(value)),
        None => Ok(query.get(param).cloned()),
    }
}

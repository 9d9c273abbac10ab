// crates/update-relay-server/src/error.rs
// ============================================================================
// Module: Service Errors
// Description: Failure taxonomy for manifest requests and its HTTP mapping.
// Purpose: Give every request failure one status code and one client message.
// Dependencies: axum, update-relay-config, update-relay-core
// ============================================================================

//! ## Overview
//! [`ServiceError`] classifies every way a manifest request can fail. The
//! message is the client-visible `error` string. Status codes depend on the
//! configured [`StatusMapping`]: `compat` keeps the 404 answers existing
//! clients expect for protocol and backend failures, `strict` reports them as
//! 400 and 500.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::StatusCode;
use update_relay_config::StatusMapping;
use update_relay_core::PolicyError;
use update_relay_storage::BlobStoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Client-visible message for signature requests without a key.
pub const SIGNING_UNAVAILABLE_MESSAGE: &str =
    "Code signing requested but no key supplied when starting server.";

/// Manifest request failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Malformed or missing request fields.
    #[error("{0}")]
    Validation(String),
    /// Signature expected but no signing key is configured.
    #[error("{SIGNING_UNAVAILABLE_MESSAGE}")]
    SigningUnavailable,
    /// No bundle, metadata, app config, asset, or rollback marker.
    #[error("{0}")]
    NotFound(String),
    /// Directive not expressible on the negotiated protocol version.
    #[error("{0}")]
    ProtocolUnsupported(String),
    /// Storage, signing, or serialization failure.
    #[error("{0}")]
    Backend(String),
}

impl ServiceError {
    /// Returns the HTTP status for this error under `mapping`.
    #[must_use]
    pub const fn status(&self, mapping: StatusMapping) -> StatusCode {
        match (self, mapping) {
            (Self::Validation(_) | Self::SigningUnavailable, _)
            | (Self::ProtocolUnsupported(_), StatusMapping::Strict) => StatusCode::BAD_REQUEST,
            (Self::NotFound(_), _)
            | (Self::ProtocolUnsupported(_) | Self::Backend(_), StatusMapping::Compat) => {
                StatusCode::NOT_FOUND
            }
            (Self::Backend(_), StatusMapping::Strict) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wraps a storage failure, keeping missing objects distinct.
    #[must_use]
    pub fn from_storage(context: &str, err: &BlobStoreError) -> Self {
        if err.is_not_found() {
            Self::NotFound(format!("{context}. Error: {err}"))
        } else {
            Self::Backend(format!("{context}. Error: {err}"))
        }
    }
}

impl From<PolicyError> for ServiceError {
    fn from(err: PolicyError) -> Self {
        Self::ProtocolUnsupported(err.to_string())
    }
}

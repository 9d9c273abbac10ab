// crates/update-relay-core/src/policy.rs
// ============================================================================
// Module: Protocol Gate
// Description: Decides between manifests and directives per protocol version.
// Purpose: Keep the protocol decision table pure and exhaustively testable.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Given the negotiated protocol version, the classification of the latest
//! bundle, and the update identifiers the client reports, the gate selects
//! one outcome: serve the manifest, answer with `noUpdateAvailable`, or answer
//! with `rollBackToEmbedded`. Directive outcomes are only reachable on
//! protocol version 1; version 0 requests that would need one fail instead.
//! Update identifiers match only when equal after trimming whitespace.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::model::ProtocolVersion;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Latest bundle as seen by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSubject<'a> {
    /// Normal bundle with its derived update identifier.
    Normal {
        /// Identifier of the latest manifest.
        latest_update_id: &'a str,
    },
    /// Bundle marked for rollback.
    Rollback,
}

/// Client-reported state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientState<'a> {
    /// Negotiated protocol version.
    pub protocol: ProtocolVersion,
    /// Identifier of the update currently running on the client.
    pub current_update_id: Option<&'a str>,
    /// Identifier of the update embedded in the client binary.
    pub embedded_update_id: Option<&'a str>,
}

/// Gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Serve the latest manifest.
    ServeManifest,
    /// Tell the client it already runs the latest update.
    NoUpdateAvailable,
    /// Tell the client to revert to its embedded update.
    RollBackToEmbedded,
}

/// Protocol violations detected by the gate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    /// Rollback requested over protocol version 0.
    #[error("Rollbacks not supported on protocol version 0")]
    RollbackUnsupported,
    /// Rollback requested without an embedded update identifier.
    #[error("Invalid Expo-Embedded-Update-ID request header specified.")]
    EmbeddedUpdateIdRequired,
    /// `noUpdateAvailable` requested over protocol version 0.
    #[error("NoUpdateAvailable directive not available in protocol version 0")]
    NoUpdateAvailableUnsupported,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates the decision table for one request.
///
/// # Errors
///
/// Returns [`PolicyError`] when the request needs a directive the negotiated
/// protocol cannot carry, or a rollback lacks the embedded identifier.
pub fn evaluate(
    subject: GateSubject<'_>,
    client: ClientState<'_>,
) -> Result<GateOutcome, PolicyError> {
    match (subject, client.protocol) {
        (GateSubject::Normal { .. }, ProtocolVersion::V0) => Ok(GateOutcome::ServeManifest),
        (GateSubject::Normal { latest_update_id }, ProtocolVersion::V1) => {
            if same_update(client.current_update_id, Some(latest_update_id)) {
                Ok(GateOutcome::NoUpdateAvailable)
            } else {
                Ok(GateOutcome::ServeManifest)
            }
        }
        (GateSubject::Rollback, ProtocolVersion::V0) => Err(PolicyError::RollbackUnsupported),
        (GateSubject::Rollback, ProtocolVersion::V1) => {
            let embedded = present(client.embedded_update_id)
                .ok_or(PolicyError::EmbeddedUpdateIdRequired)?;
            if same_update(client.current_update_id, Some(embedded)) {
                Ok(GateOutcome::NoUpdateAvailable)
            } else {
                Ok(GateOutcome::RollBackToEmbedded)
            }
        }
    }
}

/// Confirms the protocol can carry a `noUpdateAvailable` directive.
///
/// # Errors
///
/// Returns [`PolicyError::NoUpdateAvailableUnsupported`] on protocol version 0.
pub const fn ensure_no_update_supported(protocol: ProtocolVersion) -> Result<(), PolicyError> {
    if protocol.supports_directives() {
        Ok(())
    } else {
        Err(PolicyError::NoUpdateAvailableUnsupported)
    }
}

/// Returns the trimmed value when it is non-empty.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Returns true when both ids are present and equal.
fn same_update(current: Option<&str>, other: Option<&str>) -> bool {
    match (present(current), present(other)) {
        (Some(current), Some(other)) => current == other,
        _ => false,
    }
}

// crates/update-relay-core/tests/policy_gate.rs
// ============================================================================
// Module: Protocol Gate Tests
// Description: Exhaustive decision-table coverage for the protocol gate.
// ============================================================================
//! ## Overview
//! Walks every protocol/update-type combination through the gate.

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

use update_relay_core::ClientState;
use update_relay_core::GateOutcome;
use update_relay_core::GateSubject;
use update_relay_core::PolicyError;
use update_relay_core::ProtocolVersion;
use update_relay_core::policy::ensure_no_update_supported;
use update_relay_core::policy::evaluate;

const LATEST: &str = "ba7816bf-8f01-cfea-4141-40de5dae2223";

fn client<'a>(
    protocol: ProtocolVersion,
    current: Option<&'a str>,
    embedded: Option<&'a str>,
) -> ClientState<'a> {
    ClientState {
        protocol,
        current_update_id: current,
        embedded_update_id: embedded,
    }
}

// ============================================================================
// SECTION: Normal Updates
// ============================================================================

/// Tests protocol 0 always serves the manifest, even when already current.
#[test]
fn test_v0_normal_serves_manifest() {
    let subject = GateSubject::Normal {
        latest_update_id: LATEST,
    };
    let outcome = evaluate(subject, client(ProtocolVersion::V0, Some(LATEST), None)).unwrap();
    assert_eq!(outcome, GateOutcome::ServeManifest);
}

/// Tests protocol 1 answers noUpdateAvailable when the client is current.
#[test]
fn test_v1_normal_current_client_gets_no_update() {
    let subject = GateSubject::Normal {
        latest_update_id: LATEST,
    };
    let outcome = evaluate(subject, client(ProtocolVersion::V1, Some(LATEST), None)).unwrap();
    assert_eq!(outcome, GateOutcome::NoUpdateAvailable);

    let padded = format!(" {LATEST} ");
    let outcome = evaluate(subject, client(ProtocolVersion::V1, Some(&padded), None)).unwrap();
    assert_eq!(outcome, GateOutcome::NoUpdateAvailable);
}

/// Tests ids that differ only in letter case are different updates.
#[test]
fn test_v1_id_comparison_is_case_sensitive() {
    let subject = GateSubject::Normal {
        latest_update_id: LATEST,
    };
    let upper = LATEST.to_ascii_uppercase();
    let outcome = evaluate(subject, client(ProtocolVersion::V1, Some(&upper), None)).unwrap();
    assert_eq!(outcome, GateOutcome::ServeManifest);
}

/// Tests protocol 1 serves the manifest to stale or unknown clients.
#[test]
fn test_v1_normal_stale_client_gets_manifest() {
    let subject = GateSubject::Normal {
        latest_update_id: LATEST,
    };
    let stale = evaluate(subject, client(ProtocolVersion::V1, Some("other"), None)).unwrap();
    assert_eq!(stale, GateOutcome::ServeManifest);
    let unknown = evaluate(subject, client(ProtocolVersion::V1, None, None)).unwrap();
    assert_eq!(unknown, GateOutcome::ServeManifest);
}

// ============================================================================
// SECTION: Rollbacks
// ============================================================================

/// Tests rollbacks fail on protocol 0.
#[test]
fn test_v0_rollback_is_rejected() {
    let result = evaluate(GateSubject::Rollback, client(ProtocolVersion::V0, None, Some("e")));
    assert_eq!(result, Err(PolicyError::RollbackUnsupported));
    assert_eq!(
        PolicyError::RollbackUnsupported.to_string(),
        "Rollbacks not supported on protocol version 0"
    );
}

/// Tests rollbacks require an embedded update id.
#[test]
fn test_v1_rollback_requires_embedded_id() {
    for embedded in [None, Some(""), Some("   ")] {
        let result =
            evaluate(GateSubject::Rollback, client(ProtocolVersion::V1, Some("c"), embedded));
        assert_eq!(result, Err(PolicyError::EmbeddedUpdateIdRequired));
    }
    assert_eq!(
        PolicyError::EmbeddedUpdateIdRequired.to_string(),
        "Invalid Expo-Embedded-Update-ID request header specified."
    );
}

/// Tests a client already on its embedded update gets noUpdateAvailable.
#[test]
fn test_v1_rollback_on_embedded_gets_no_update() {
    let outcome =
        evaluate(GateSubject::Rollback, client(ProtocolVersion::V1, Some("e"), Some("e"))).unwrap();
    assert_eq!(outcome, GateOutcome::NoUpdateAvailable);
}

/// Tests a client off its embedded update is told to roll back.
#[test]
fn test_v1_rollback_directive() {
    let outcome =
        evaluate(GateSubject::Rollback, client(ProtocolVersion::V1, Some("c"), Some("e"))).unwrap();
    assert_eq!(outcome, GateOutcome::RollBackToEmbedded);
    let outcome =
        evaluate(GateSubject::Rollback, client(ProtocolVersion::V1, None, Some("e"))).unwrap();
    assert_eq!(outcome, GateOutcome::RollBackToEmbedded);
}

/// Tests the noUpdateAvailable directive is gated on protocol 1.
#[test]
fn test_no_update_directive_requires_v1() {
    assert!(ensure_no_update_supported(ProtocolVersion::V1).is_ok());
    let err = ensure_no_update_supported(ProtocolVersion::V0).unwrap_err();
    assert_eq!(err.to_string(), "NoUpdateAvailable directive not available in protocol version 0");
}

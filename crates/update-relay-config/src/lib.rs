// crates/update-relay-config/src/lib.rs
// ============================================================================
// Module: Update Relay Config Library
// Description: Configuration model and validation for update-relay.toml.
// Purpose: Single source of truth for update relay configuration semantics.
// Dependencies: update-relay-core, serde, toml
// ============================================================================

//! ## Overview
//! `update-relay-config` defines the configuration model for the update relay
//! server. Files are size-limited, parsed from TOML, overlaid with storage
//! credentials from the environment, and validated fail-closed before any
//! component is constructed from them.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;

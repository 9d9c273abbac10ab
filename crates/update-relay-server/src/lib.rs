// crates/update-relay-server/src/lib.rs
// ============================================================================
// Module: Update Relay Server
// Description: Update resolution, manifest assembly, and the HTTP surface.
// Purpose: Answer update checks with manifests or directives.
// Dependencies: axum, ring, tokio, update-relay-config, update-relay-core, update-relay-storage
// ============================================================================

//! ## Overview
//! `update-relay-server` turns a client's update check into a response: the
//! [`UpdateResolver`] finds the newest bundle for a runtime version, the
//! update-type gate picks a manifest or a directive, the
//! [`ManifestAssembler`] and [`DirectiveBuilder`] build the payload, the
//! [`CodeSigner`] signs it when asked, and the packager frames it as
//! `multipart/mixed`. [`UpdateRelayServer`] exposes this as
//! `GET /api/manifest`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod assembler;
pub mod cache;
pub mod directives;
pub mod error;
pub mod packager;
pub mod request;
pub mod resolver;
pub mod server;
pub mod service;
pub mod signing;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use assembler::AssetRequest;
pub use assembler::AssetUrlSource;
pub use assembler::ManifestAssembler;
pub use cache::BundleMetadata;
pub use cache::CacheCounts;
pub use cache::CacheTtls;
pub use cache::MetadataCache;
pub use directives::DirectiveBuilder;
pub use error::ServiceError;
pub use packager::ResponseKind;
pub use packager::ResponsePackage;
pub use request::ManifestRequest;
pub use resolver::UpdateResolver;
pub use server::ServerError;
pub use server::UpdateRelayServer;
pub use server::build_logger;
pub use server::service_for_store;
pub use service::Resolution;
pub use service::ServiceOptions;
pub use service::UpdateService;
pub use signing::CodeSigner;
pub use signing::SigningError;
pub use signing::SigningKey;

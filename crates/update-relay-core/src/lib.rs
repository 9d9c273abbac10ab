// crates/update-relay-core/src/lib.rs
// ============================================================================
// Module: Update Relay Core
// Description: Domain model and wire codecs for over-the-air update serving.
// Purpose: Keep every deterministic, I/O-free piece of the update protocol in one crate.
// Dependencies: serde, sha2, md-5, base64, rand, time
// ============================================================================

//! ## Overview
//! `update-relay-core` defines the update-distribution data model (bundle paths,
//! manifests, asset metadata, directives), the content hashes that make
//! manifest identifiers deterministic, the structured-field dictionary grammar
//! used for signatures, the byte-exact multipart framing, the protocol-version
//! gate, a TTL cache primitive, and the structured log sink shared by the
//! storage and server crates. Nothing in this crate performs I/O except the
//! log sinks.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod hashing;
pub mod logging;
pub mod model;
pub mod multipart;
pub mod policy;
pub mod sfv;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::CacheEntry;
pub use cache::Clock;
pub use cache::ManualClock;
pub use cache::SystemClock;
pub use cache::TtlCache;
pub use hashing::HashError;
pub use logging::FileLogSink;
pub use logging::LogEvent;
pub use logging::LogLevel;
pub use logging::LogSink;
pub use logging::Logger;
pub use logging::MemoryLogSink;
pub use logging::NoopLogSink;
pub use logging::StderrLogSink;
pub use model::AssetDescriptor;
pub use model::AssetMetadata;
pub use model::BundleDescriptor;
pub use model::BundlePath;
pub use model::Directive;
pub use model::Manifest;
pub use model::ManifestExtra;
pub use model::ModelError;
pub use model::Platform;
pub use model::PlatformFiles;
pub use model::ProtocolVersion;
pub use model::RollbackParameters;
pub use model::RuntimeVersion;
pub use model::UpdateType;
pub use model::iso_timestamp;
pub use multipart::Boundary;
pub use multipart::MultipartBuilder;
pub use multipart::Part;
pub use policy::ClientState;
pub use policy::GateOutcome;
pub use policy::GateSubject;
pub use policy::PolicyError;
pub use sfv::BareItem;
pub use sfv::Dictionary;
pub use sfv::Member;
pub use sfv::SfvError;

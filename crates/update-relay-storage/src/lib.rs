// crates/update-relay-storage/src/lib.rs
// ============================================================================
// Module: Update Relay Storage
// Description: Blob store port and storage adapters for update bundles.
// Purpose: Give the update service one async interface over every backend.
// Dependencies: aws-sdk-s3, reqwest, ring, update-relay-config, update-relay-core
// ============================================================================

//! ## Overview
//! `update-relay-storage` exposes the [`BlobStore`] port consumed by the
//! update service, an S3 adapter, a DogeCloud adapter that runs on issued
//! temporary credentials, an in-memory store for tests and local runs, and
//! the [`CredentialCache`] port the DogeCloud adapter shares issued
//! credentials through. Stores are constructed explicitly from configuration
//! with [`connect_blob_store`]; there is no process-global store.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod blob;
pub mod credential_cache;
pub mod dogecloud;
pub mod memory;
pub mod provider;
pub mod s3;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use blob::BlobObject;
pub use blob::BlobStore;
pub use blob::BlobStoreError;
pub use blob::ListPage;
pub use blob::ListRequest;
pub use blob::ObjectEntry;
pub use blob::ObjectMetadata;
pub use blob::list_all;
pub use credential_cache::CredentialCache;
pub use credential_cache::CredentialCacheError;
pub use credential_cache::InMemoryCredentialCache;
pub use dogecloud::CredentialIssuer;
pub use dogecloud::DogeCloudBlobStore;
pub use dogecloud::DogeCloudIssuer;
pub use dogecloud::IssuedBucket;
pub use dogecloud::IssuedCredentials;
pub use dogecloud::S3SessionOpener;
pub use dogecloud::SessionOpener;
pub use dogecloud::TemporaryCredentialManager;
pub use dogecloud::TemporaryCredentials;
pub use dogecloud::select_bucket;
pub use dogecloud::sign_token_request;
pub use memory::InMemoryBlobStore;
pub use memory::StoreCalls;
pub use provider::StorageDeps;
pub use provider::connect_blob_store;
pub use s3::S3BlobStore;
pub use s3::S3Settings;
pub use s3::StaticCredentials;

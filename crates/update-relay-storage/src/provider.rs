// crates/update-relay-storage/src/provider.rs
// ============================================================================
// Module: Blob Store Provider
// Description: Builds the configured blob store adapter.
// Purpose: Map storage configuration onto a concrete adapter instance.
// Dependencies: update-relay-config
// ============================================================================

//! ## Overview
//! [`connect_blob_store`] turns a validated [`StorageConfig`] into a shared
//! [`BlobStore`]. Collaborators the adapters need beyond configuration travel
//! in [`StorageDeps`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use update_relay_config::StorageConfig;
use update_relay_config::StorageProvider;
use update_relay_core::Logger;

use crate::blob::BlobStore;
use crate::blob::BlobStoreError;
use crate::credential_cache::CredentialCache;
use crate::credential_cache::InMemoryCredentialCache;
use crate::dogecloud::DogeCloudBlobStore;
use crate::dogecloud::DogeCloudIssuer;
use crate::dogecloud::TemporaryCredentialManager;
use crate::s3::S3BlobStore;
use crate::s3::S3Settings;
use crate::s3::StaticCredentials;

// ============================================================================
// SECTION: Dependencies
// ============================================================================

/// Collaborators shared by storage adapters.
#[derive(Clone)]
pub struct StorageDeps {
    /// Operation logger.
    pub logger: Logger,
    /// Cache for issued credentials.
    pub credential_cache: Arc<dyn CredentialCache>,
}

impl StorageDeps {
    /// Uses `logger` and a process-local credential cache.
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            credential_cache: Arc::new(InMemoryCredentialCache::new()),
        }
    }

    /// Replaces the credential cache.
    #[must_use]
    pub fn with_credential_cache(mut self, cache: Arc<dyn CredentialCache>) -> Self {
        self.credential_cache = cache;
        self
    }
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Connects the adapter selected by `config.provider`.
///
/// # Errors
///
/// Returns [`BlobStoreError::Invalid`] for incomplete configuration and
/// [`BlobStoreError::Credential`] when DogeCloud credentials cannot be issued.
pub async fn connect_blob_store(
    config: &StorageConfig,
    deps: &StorageDeps,
) -> Result<Arc<dyn BlobStore>, BlobStoreError> {
    match config.provider {
        StorageProvider::S3 => {
            let settings = S3Settings {
                bucket: config.bucket.clone(),
                region: config.region.clone(),
                endpoint: config.endpoint.clone(),
                force_path_style: config.force_path_style,
                credentials: config.static_credentials().map(|(access_key, secret_key)| {
                    StaticCredentials {
                        access_key: access_key.to_string(),
                        secret_key: secret_key.to_string(),
                        session_token: None,
                    }
                }),
            };
            let store = S3BlobStore::connect(&settings, deps.logger.clone()).await?;
            Ok(Arc::new(store))
        }
        StorageProvider::DogeCloud => {
            let (access_key, secret_key) = config.static_credentials().ok_or_else(|| {
                BlobStoreError::Invalid("dogecloud requires access_key and secret_key".to_string())
            })?;
            let issuer = DogeCloudIssuer::new(&config.dogecloud, access_key, secret_key)?;
            let manager = TemporaryCredentialManager::new(
                Arc::new(issuer),
                Arc::clone(&deps.credential_cache),
                config.dogecloud.credential_cache_key.clone(),
                Duration::from_secs(config.dogecloud.credential_cache_ttl_secs),
                deps.logger.clone(),
            );
            let store = DogeCloudBlobStore::connect(
                manager,
                config.bucket.clone(),
                config.force_path_style,
                deps.logger.clone(),
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}

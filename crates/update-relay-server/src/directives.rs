// crates/update-relay-server/src/directives.rs
// ============================================================================
// Module: Directive Builder
// Description: Rollback and no-update-available directive construction.
// Purpose: Produce the control messages served instead of a manifest.
// Dependencies: update-relay-core, update-relay-storage
// ============================================================================

//! ## Overview
//! A rollback directive carries the time its marker object was committed.
//! Directives are cached per bundle; the marker is read once per TTL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use update_relay_core::BundlePath;
use update_relay_core::Directive;
use update_relay_core::Logger;
use update_relay_storage::BlobStore;

use crate::assembler::object_timestamp;
use crate::cache;
use crate::cache::MetadataCache;
use crate::error::ServiceError;

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds directives for rollback bundles.
#[derive(Clone)]
pub struct DirectiveBuilder {
    /// Bundle storage.
    store: Arc<dyn BlobStore>,
    /// Shared result cache.
    cache: Arc<MetadataCache>,
    /// Largest object read into memory.
    max_object_bytes: usize,
    /// Diagnostics logger.
    logger: Logger,
}

impl DirectiveBuilder {
    /// Creates a directive builder.
    #[must_use]
    pub const fn new(
        store: Arc<dyn BlobStore>,
        cache: Arc<MetadataCache>,
        max_object_bytes: usize,
        logger: Logger,
    ) -> Self {
        Self {
            store,
            cache,
            max_object_bytes,
            logger,
        }
    }

    /// Builds the `rollBackToEmbedded` directive for a rollback bundle.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the marker is missing and
    /// [`ServiceError::Backend`] when it cannot be read.
    pub async fn build_rollback(&self, bundle: &BundlePath) -> Result<Directive, ServiceError> {
        let key = cache::rollback_key(bundle);
        let ttl = self.cache.ttls().rollback;
        self.cache
            .rollbacks()
            .get_or_compute(&key, ttl, || async move {
                let marker_key = bundle.rollback_key();
                let marker = self
                    .store
                    .get(&marker_key, self.max_object_bytes)
                    .await
                    .map_err(|err| ServiceError::from_storage("No rollback found", &err))?;
                let commit_time = object_timestamp(
                    self.store.as_ref(),
                    &marker_key,
                    marker.metadata.last_modified,
                    &self.logger,
                )
                .await?;
                Ok(Directive::roll_back_to_embedded(commit_time))
            })
            .await
    }
}

/// Returns the `noUpdateAvailable` directive.
#[must_use]
pub const fn no_update_available() -> Directive {
    Directive::NoUpdateAvailable
}

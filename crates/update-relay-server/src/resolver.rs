// crates/update-relay-server/src/resolver.rs
// ============================================================================
// Module: Update Resolver
// Description: Latest-bundle lookup, bundle classification, cached object checks.
// Purpose: Map a runtime version onto the bundle clients should receive.
// Dependencies: update-relay-core, update-relay-storage
// ============================================================================

//! ## Overview
//! Bundles live under `updates/<runtimeVersion>/<timestamp>/`. The resolver
//! lists the immediate sub-directories of a runtime version, keeps the
//! purely numeric ones, and picks the numerically largest. A bundle whose
//! directory holds a `rollback` entry is a rollback bundle. Every lookup goes
//! through the [`MetadataCache`]; storage errors are never cached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use update_relay_core::BundlePath;
use update_relay_core::RuntimeVersion;
use update_relay_core::UpdateType;
use update_relay_core::model::ROLLBACK_MARKER;
use update_relay_storage::BlobStore;
use update_relay_storage::BlobStoreError;
use update_relay_storage::ListRequest;
use update_relay_storage::list_all;

use crate::cache;
use crate::cache::MetadataCache;
use crate::error::ServiceError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Delimiter grouping keys into directories.
const DIRECTORY_DELIMITER: &str = "/";

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves and classifies bundles for runtime versions.
#[derive(Clone)]
pub struct UpdateResolver {
    /// Bundle storage.
    store: Arc<dyn BlobStore>,
    /// Shared result cache.
    cache: Arc<MetadataCache>,
}

impl UpdateResolver {
    /// Creates a resolver over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, cache: Arc<MetadataCache>) -> Self {
        Self {
            store,
            cache,
        }
    }

    /// Returns the newest bundle published for `runtime_version`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when no numeric bundle directory
    /// exists and [`ServiceError::Backend`] when listing fails.
    pub async fn resolve_latest_bundle(
        &self,
        runtime_version: &RuntimeVersion,
    ) -> Result<BundlePath, ServiceError> {
        let key = cache::latest_bundle_key(runtime_version);
        let ttl = self.cache.ttls().latest_bundle;
        self.cache
            .latest_bundles()
            .get_or_compute(&key, ttl, || async move {
                let prefix = runtime_version.bundles_prefix();
                let request = ListRequest::new(prefix.as_str()).delimiter(DIRECTORY_DELIMITER);
                let listing = list_all(self.store.as_ref(), &request).await.map_err(|err| {
                    ServiceError::Backend(format!("listing {prefix} failed: {err}"))
                })?;
                let latest = latest_numeric_child(&listing.common_prefixes, &prefix).ok_or_else(
                    || {
                        ServiceError::NotFound(format!(
                            "No updates found for runtime version {runtime_version}"
                        ))
                    },
                )?;
                BundlePath::parse(&format!("{prefix}{latest}"))
                    .map_err(|err| ServiceError::Backend(err.to_string()))
            })
            .await
    }

    /// Returns entry names directly under `prefix`, without the prefix or
    /// trailing slashes.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Backend`] when listing fails.
    pub async fn directory_contents(&self, prefix: &str) -> Result<Vec<String>, ServiceError> {
        let key = cache::directory_key(prefix);
        let ttl = self.cache.ttls().directory;
        self.cache
            .directories()
            .get_or_compute(&key, ttl, || async move {
                let request = ListRequest::new(prefix).delimiter(DIRECTORY_DELIMITER);
                let listing = list_all(self.store.as_ref(), &request).await.map_err(|err| {
                    ServiceError::Backend(format!("listing {prefix} failed: {err}"))
                })?;
                let names = listing
                    .entries
                    .iter()
                    .map(|entry| entry.key.as_str())
                    .chain(listing.common_prefixes.iter().map(String::as_str))
                    .filter_map(|key| key.strip_prefix(prefix))
                    .map(|name| name.trim_end_matches('/').to_string())
                    .filter(|name| !name.is_empty())
                    .collect();
                Ok(names)
            })
            .await
    }

    /// Classifies a bundle as normal or rollback.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Backend`] when listing fails.
    pub async fn classify(&self, bundle: &BundlePath) -> Result<UpdateType, ServiceError> {
        let contents = self.directory_contents(&bundle.directory_prefix()).await?;
        if contents.iter().any(|name| name == ROLLBACK_MARKER) {
            Ok(UpdateType::Rollback)
        } else {
            Ok(UpdateType::Normal)
        }
    }

    /// Returns whether an object exists, caching hits longer than misses.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Backend`] for failures other than a missing object.
    pub async fn object_exists(&self, object_key: &str) -> Result<bool, ServiceError> {
        let key = cache::exists_key(object_key);
        if let Some(known) = self.cache.exists().get(&key) {
            return Ok(known);
        }
        let exists = match self.store.head(object_key).await {
            Ok(_) => true,
            Err(BlobStoreError::NotFound(_)) => false,
            Err(err) => {
                return Err(ServiceError::Backend(format!("head {object_key} failed: {err}")));
            }
        };
        let ttls = self.cache.ttls();
        let ttl = if exists { ttls.exists_hit } else { ttls.exists_miss };
        self.cache.exists().insert(key, exists, ttl);
        Ok(exists)
    }

    /// Returns a presigned GET URL, cached for half its validity at most.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Backend`] when the store cannot presign.
    pub async fn presigned_url(
        &self,
        object_key: &str,
        expires_in: Duration,
    ) -> Result<String, ServiceError> {
        let key = cache::presign_key(object_key, expires_in);
        let ttl = self.cache.ttls().presign(expires_in);
        self.cache
            .presigned()
            .get_or_compute(&key, ttl, || async move {
                self.store
                    .presign(object_key, expires_in)
                    .await
                    .map_err(|err| ServiceError::Backend(format!("presign {object_key}: {err}")))
            })
            .await
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the numerically largest purely numeric child name under `prefix`.
///
/// Names of any length compare by their digits with leading zeros removed.
fn latest_numeric_child<'a>(common_prefixes: &'a [String], prefix: &str) -> Option<&'a str> {
    common_prefixes
        .iter()
        .filter_map(|common| common.strip_prefix(prefix))
        .map(|name| name.trim_end_matches('/'))
        .filter(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
        .max_by(|left, right| compare_digits(left, right))
}

/// Orders two ASCII digit strings by numeric value.
fn compare_digits(left: &str, right: &str) -> Ordering {
    let left = left.trim_start_matches('0');
    let right = right.trim_start_matches('0');
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}

// crates/update-relay-server/src/cache.rs
// ============================================================================
// Module: Metadata Cache
// Description: Per-operation TTL caches over storage-derived results.
// Purpose: Avoid repeated storage reads for bundle resolution and metadata.
// Dependencies: update-relay-config, update-relay-core
// ============================================================================

//! ## Overview
//! [`MetadataCache`] groups one [`TtlCache`] per cached operation so each
//! result type keeps its own TTL and key space. Keys embed every input that
//! changes the result. Failures are never cached; concurrent misses on the
//! same key may both compute.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use update_relay_config::CacheConfig;
use update_relay_core::AssetMetadata;
use update_relay_core::BundleDescriptor;
use update_relay_core::BundlePath;
use update_relay_core::Clock;
use update_relay_core::Directive;
use update_relay_core::Platform;
use update_relay_core::RuntimeVersion;
use update_relay_core::SystemClock;
use update_relay_core::TtlCache;

// ============================================================================
// SECTION: TTL Policy
// ============================================================================

/// TTLs per cached operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Latest bundle path per runtime version.
    pub latest_bundle: Duration,
    /// Directory listings.
    pub directory: Duration,
    /// Bundle metadata documents.
    pub metadata: Duration,
    /// App configuration documents.
    pub app_config: Duration,
    /// Asset metadata.
    pub asset: Duration,
    /// Rollback directives.
    pub rollback: Duration,
    /// Positive existence checks.
    pub exists_hit: Duration,
    /// Negative existence checks.
    pub exists_miss: Duration,
    /// Upper bound for cached presigned URLs.
    pub presign_max: Duration,
}

impl CacheTtls {
    /// Returns the TTL for a presigned URL valid for `expires_in`.
    #[must_use]
    pub fn presign(&self, expires_in: Duration) -> Duration {
        (expires_in / 2).min(self.presign_max)
    }
}

impl From<&CacheConfig> for CacheTtls {
    fn from(config: &CacheConfig) -> Self {
        Self {
            latest_bundle: Duration::from_secs(config.latest_bundle_secs),
            directory: Duration::from_secs(config.directory_secs),
            metadata: Duration::from_secs(config.metadata_secs),
            app_config: Duration::from_secs(config.app_config_secs),
            asset: Duration::from_secs(config.asset_secs),
            rollback: Duration::from_secs(config.rollback_secs),
            exists_hit: Duration::from_secs(config.exists_hit_secs),
            exists_miss: Duration::from_secs(config.exists_miss_secs),
            presign_max: Duration::from_secs(config.presign_max_secs),
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

// ============================================================================
// SECTION: Cached Values
// ============================================================================

/// Parsed bundle metadata with its derived identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMetadata {
    /// Parsed descriptor.
    pub descriptor: BundleDescriptor,
    /// Creation time, ISO-8601 UTC.
    pub created_at: String,
    /// Update identifier derived from the descriptor bytes.
    pub id: String,
}

/// Entry counts per cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounts {
    /// Latest bundle entries.
    pub latest_bundle: usize,
    /// Directory listing entries.
    pub directory: usize,
    /// Metadata entries.
    pub metadata: usize,
    /// App configuration entries.
    pub app_config: usize,
    /// Asset metadata entries.
    pub asset: usize,
    /// Rollback directive entries.
    pub rollback: usize,
    /// Existence check entries.
    pub exists: usize,
    /// Presigned URL entries.
    pub presign: usize,
}

impl CacheCounts {
    /// Returns the total number of entries.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.latest_bundle
            + self.directory
            + self.metadata
            + self.app_config
            + self.asset
            + self.rollback
            + self.exists
            + self.presign
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Process-wide cache of storage-derived results.
pub struct MetadataCache {
    /// TTL policy.
    ttls: CacheTtls,
    /// Latest bundle per runtime version.
    latest_bundles: TtlCache<BundlePath>,
    /// Directory entry names per prefix.
    directories: TtlCache<Vec<String>>,
    /// Bundle metadata per bundle and runtime version.
    metadata: TtlCache<BundleMetadata>,
    /// App configuration per bundle and runtime version.
    app_configs: TtlCache<Value>,
    /// Asset metadata per asset, runtime version, and platform, without its URL.
    assets: TtlCache<AssetMetadata>,
    /// Rollback directive per bundle.
    rollbacks: TtlCache<Directive>,
    /// Object existence per key.
    exists: TtlCache<bool>,
    /// Presigned URL per key and expiry.
    presigned: TtlCache<String>,
}

impl MetadataCache {
    /// Creates an empty cache on the system clock.
    #[must_use]
    pub fn new(ttls: CacheTtls) -> Self {
        Self::with_clock(ttls, Arc::new(SystemClock))
    }

    /// Creates an empty cache on the supplied clock.
    #[must_use]
    pub fn with_clock(ttls: CacheTtls, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttls,
            latest_bundles: TtlCache::with_clock(Arc::clone(&clock)),
            directories: TtlCache::with_clock(Arc::clone(&clock)),
            metadata: TtlCache::with_clock(Arc::clone(&clock)),
            app_configs: TtlCache::with_clock(Arc::clone(&clock)),
            assets: TtlCache::with_clock(Arc::clone(&clock)),
            rollbacks: TtlCache::with_clock(Arc::clone(&clock)),
            exists: TtlCache::with_clock(Arc::clone(&clock)),
            presigned: TtlCache::with_clock(clock),
        }
    }

    /// Returns the TTL policy.
    #[must_use]
    pub const fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Latest bundle cache.
    #[must_use]
    pub const fn latest_bundles(&self) -> &TtlCache<BundlePath> {
        &self.latest_bundles
    }

    /// Directory listing cache.
    #[must_use]
    pub const fn directories(&self) -> &TtlCache<Vec<String>> {
        &self.directories
    }

    /// Bundle metadata cache.
    #[must_use]
    pub const fn metadata(&self) -> &TtlCache<BundleMetadata> {
        &self.metadata
    }

    /// App configuration cache.
    #[must_use]
    pub const fn app_configs(&self) -> &TtlCache<Value> {
        &self.app_configs
    }

    /// Asset metadata cache.
    #[must_use]
    pub const fn assets(&self) -> &TtlCache<AssetMetadata> {
        &self.assets
    }

    /// Rollback directive cache.
    #[must_use]
    pub const fn rollbacks(&self) -> &TtlCache<Directive> {
        &self.rollbacks
    }

    /// Existence check cache.
    #[must_use]
    pub const fn exists(&self) -> &TtlCache<bool> {
        &self.exists
    }

    /// Presigned URL cache.
    #[must_use]
    pub const fn presigned(&self) -> &TtlCache<String> {
        &self.presigned
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.latest_bundles.clear();
        self.directories.clear();
        self.metadata.clear();
        self.app_configs.clear();
        self.assets.clear();
        self.rollbacks.clear();
        self.exists.clear();
        self.presigned.clear();
    }

    /// Returns entry counts per cache, expired entries included.
    #[must_use]
    pub fn counts(&self) -> CacheCounts {
        CacheCounts {
            latest_bundle: self.latest_bundles.len(),
            directory: self.directories.len(),
            metadata: self.metadata.len(),
            app_config: self.app_configs.len(),
            asset: self.assets.len(),
            rollback: self.rollbacks.len(),
            exists: self.exists.len(),
            presign: self.presigned.len(),
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(CacheTtls::default())
    }
}

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Key for the latest bundle of a runtime version.
#[must_use]
pub fn latest_bundle_key(runtime_version: &RuntimeVersion) -> String {
    format!("latest-bundle:{runtime_version}")
}

/// Key for a directory listing.
#[must_use]
pub fn directory_key(prefix: &str) -> String {
    format!("directory:{prefix}")
}

/// Key for bundle metadata.
#[must_use]
pub fn metadata_key(bundle: &BundlePath, runtime_version: &RuntimeVersion) -> String {
    format!("metadata:{bundle}:{runtime_version}")
}

/// Key for an app configuration document.
#[must_use]
pub fn app_config_key(bundle: &BundlePath, runtime_version: &RuntimeVersion) -> String {
    format!("app-config:{bundle}:{runtime_version}")
}

/// Key for one asset's metadata.
#[must_use]
pub fn asset_key(
    bundle: &BundlePath,
    file_path: &str,
    runtime_version: &RuntimeVersion,
    platform: Platform,
) -> String {
    format!("asset:{bundle}:{file_path}:{runtime_version}:{platform}")
}

/// Key for a bundle's rollback directive.
#[must_use]
pub fn rollback_key(bundle: &BundlePath) -> String {
    format!("rollback:{bundle}")
}

/// Key for an existence check.
#[must_use]
pub fn exists_key(object_key: &str) -> String {
    format!("exists:{object_key}")
}

/// Key for a presigned URL.
#[must_use]
pub fn presign_key(object_key: &str, expires_in: Duration) -> String {
    format!("presign:{object_key}:{}", expires_in.as_secs())
}

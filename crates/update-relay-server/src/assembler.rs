// crates/update-relay-server/src/assembler.rs
// ============================================================================
// Module: Manifest Assembler
// Description: Bundle metadata, app config, and asset metadata loading.
// Purpose: Build the manifest document for a bundle and platform.
// Dependencies: mime_guess, url, update-relay-core, update-relay-storage
// ============================================================================

//! ## Overview
//! The assembler reads a bundle's `metadata.json`, derives the update id from
//! its exact bytes, reads `expoConfig.json`, and fetches every asset listed
//! for the requested platform to compute content hashes. It never writes to
//! storage. All loaded documents go through the [`MetadataCache`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use serde_json::Value;
use update_relay_core::AssetMetadata;
use update_relay_core::BundleDescriptor;
use update_relay_core::BundlePath;
use update_relay_core::LogEvent;
use update_relay_core::LogLevel;
use update_relay_core::Logger;
use update_relay_core::Manifest;
use update_relay_core::ManifestExtra;
use update_relay_core::Platform;
use update_relay_core::RuntimeVersion;
use update_relay_core::hashing;
use update_relay_core::iso_timestamp;
use update_relay_storage::BlobStore;

use crate::cache;
use crate::cache::BundleMetadata;
use crate::cache::MetadataCache;
use crate::error::ServiceError;
use crate::resolver::UpdateResolver;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Log component for the assembler.
const COMPONENT: &str = "assembler";
/// Content type of every launch asset.
pub const LAUNCH_ASSET_CONTENT_TYPE: &str = "application/javascript";
/// File extension of every launch asset.
pub const LAUNCH_ASSET_EXTENSION: &str = ".bundle";
/// Content type for unknown extensions.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// SECTION: Asset URLs
// ============================================================================

/// Source of asset download URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetUrlSource {
    /// `<host>/<key>?runtimeVersion=..&platform=..`.
    PublicHost(String),
    /// Presigned storage URLs valid for the given duration.
    Presigned(Duration),
}

/// One asset to describe.
#[derive(Debug, Clone, Copy)]
pub struct AssetRequest<'a> {
    /// Bundle holding the asset.
    pub bundle: &'a BundlePath,
    /// Path of the asset inside the bundle.
    pub file_path: &'a str,
    /// Declared extension; `None` for the launch asset.
    pub ext: Option<&'a str>,
    /// Requested runtime version.
    pub runtime_version: &'a RuntimeVersion,
    /// Requested platform.
    pub platform: Platform,
}

// ============================================================================
// SECTION: Assembler
// ============================================================================

/// Builds manifests from stored bundles.
#[derive(Clone)]
pub struct ManifestAssembler {
    /// Bundle storage.
    store: Arc<dyn BlobStore>,
    /// Shared result cache.
    cache: Arc<MetadataCache>,
    /// Resolver used for presigned URLs.
    resolver: UpdateResolver,
    /// Asset URL source.
    urls: AssetUrlSource,
    /// Largest object read into memory.
    max_object_bytes: usize,
    /// Diagnostics logger.
    logger: Logger,
}

impl ManifestAssembler {
    /// Creates an assembler.
    #[must_use]
    pub fn new(
        store: Arc<dyn BlobStore>,
        cache: Arc<MetadataCache>,
        urls: AssetUrlSource,
        max_object_bytes: usize,
        logger: Logger,
    ) -> Self {
        let resolver = UpdateResolver::new(Arc::clone(&store), Arc::clone(&cache));
        Self {
            store,
            cache,
            resolver,
            urls,
            max_object_bytes,
            logger,
        }
    }

    /// Loads the bundle descriptor with its creation time and update id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when `metadata.json` is missing and
    /// [`ServiceError::Backend`] when it cannot be read or parsed.
    pub async fn load_metadata(
        &self,
        bundle: &BundlePath,
        runtime_version: &RuntimeVersion,
    ) -> Result<BundleMetadata, ServiceError> {
        let key = cache::metadata_key(bundle, runtime_version);
        let ttl = self.cache.ttls().metadata;
        self.cache
            .metadata()
            .get_or_compute(&key, ttl, || async move {
                let context = format!("No update found with runtime version: {runtime_version}");
                let object_key = bundle.metadata_key();
                let object = self
                    .store
                    .get(&object_key, self.max_object_bytes)
                    .await
                    .map_err(|err| ServiceError::from_storage(&context, &err))?;
                let descriptor: BundleDescriptor = serde_json::from_slice(&object.body)
                    .map_err(|err| ServiceError::Backend(format!("{context}. Error: {err}")))?;
                let created_at = object_timestamp(
                    self.store.as_ref(),
                    &object_key,
                    object.metadata.last_modified,
                    &self.logger,
                )
                .await?;
                Ok(BundleMetadata {
                    descriptor,
                    created_at,
                    id: hashing::update_id(&object.body),
                })
            })
            .await
    }

    /// Loads the exported app configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when `expoConfig.json` is missing and
    /// [`ServiceError::Backend`] when it cannot be read or parsed.
    pub async fn load_app_config(
        &self,
        bundle: &BundlePath,
        runtime_version: &RuntimeVersion,
    ) -> Result<Value, ServiceError> {
        let key = cache::app_config_key(bundle, runtime_version);
        let ttl = self.cache.ttls().app_config;
        self.cache
            .app_configs()
            .get_or_compute(&key, ttl, || async move {
                let context =
                    format!("No expo config json found with runtime version: {runtime_version}");
                let object = self
                    .store
                    .get(&bundle.app_config_key(), self.max_object_bytes)
                    .await
                    .map_err(|err| ServiceError::from_storage(&context, &err))?;
                serde_json::from_slice(&object.body)
                    .map_err(|err| ServiceError::Backend(format!("{context}. Error: {err}")))
            })
            .await
    }

    /// Describes one asset: content hashes, type, and download URL.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the asset is missing and
    /// [`ServiceError::Backend`] when it cannot be read or addressed.
    pub async fn asset_metadata(
        &self,
        request: AssetRequest<'_>,
    ) -> Result<AssetMetadata, ServiceError> {
        let key = cache::asset_key(
            request.bundle,
            request.file_path,
            request.runtime_version,
            request.platform,
        );
        let ttl = self.cache.ttls().asset;
        let object_key = request.bundle.object_key(request.file_path);
        let mut described = self
            .cache
            .assets()
            .get_or_compute(&key, ttl, || async {
                let object = self
                    .store
                    .get(&object_key, self.max_object_bytes)
                    .await
                    .map_err(|err| {
                        ServiceError::from_storage(&format!("Asset {object_key} unavailable"), &err)
                    })?;
                let (file_extension, content_type) = match request.ext {
                    None => {
                        (LAUNCH_ASSET_EXTENSION.to_string(), LAUNCH_ASSET_CONTENT_TYPE.to_string())
                    }
                    Some(ext) => (format!(".{ext}"), content_type_for(ext).to_string()),
                };
                Ok::<_, ServiceError>(AssetMetadata {
                    hash: hashing::sha256_base64url(&object.body),
                    key: hashing::md5_hex(&object.body),
                    file_extension,
                    content_type,
                    url: String::new(),
                })
            })
            .await?;
        // Cached entries carry no URL; presigned ones follow the presign TTL.
        described.url = self.asset_url(&object_key, request).await?;
        Ok(described)
    }

    /// Builds the full manifest for `platform`, loading metadata first.
    ///
    /// # Errors
    ///
    /// Returns the first [`ServiceError`] from any document or asset load.
    pub async fn build_manifest(
        &self,
        bundle: &BundlePath,
        runtime_version: &RuntimeVersion,
        platform: Platform,
    ) -> Result<Manifest, ServiceError> {
        let metadata = self.load_metadata(bundle, runtime_version).await?;
        self.assemble(bundle, runtime_version, platform, &metadata).await
    }

    /// Builds the full manifest from already loaded metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the platform has no files or a
    /// referenced document is missing.
    pub async fn assemble(
        &self,
        bundle: &BundlePath,
        runtime_version: &RuntimeVersion,
        platform: Platform,
        metadata: &BundleMetadata,
    ) -> Result<Manifest, ServiceError> {
        let files = metadata.descriptor.platform(platform).ok_or_else(|| {
            ServiceError::NotFound(format!("No {platform} files in update {bundle}"))
        })?;
        let app_config = self.load_app_config(bundle, runtime_version).await?;
        let mut assets = Vec::with_capacity(files.assets.len());
        for asset in &files.assets {
            let described = self
                .asset_metadata(AssetRequest {
                    bundle,
                    file_path: &asset.path,
                    ext: Some(&asset.ext),
                    runtime_version,
                    platform,
                })
                .await?;
            assets.push(described);
        }
        let launch_asset = self
            .asset_metadata(AssetRequest {
                bundle,
                file_path: &files.bundle,
                ext: None,
                runtime_version,
                platform,
            })
            .await?;
        Ok(Manifest {
            id: metadata.id.clone(),
            created_at: metadata.created_at.clone(),
            runtime_version: runtime_version.as_str().to_string(),
            assets,
            launch_asset,
            metadata: std::collections::BTreeMap::new(),
            extra: ManifestExtra {
                app_config,
            },
        })
    }

    /// Returns the download URL for an asset key.
    async fn asset_url(
        &self,
        object_key: &str,
        request: AssetRequest<'_>,
    ) -> Result<String, ServiceError> {
        match &self.urls {
            AssetUrlSource::PublicHost(host) => {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("runtimeVersion", request.runtime_version.as_str())
                    .append_pair("platform", request.platform.as_str())
                    .finish();
                Ok(format!("{host}/{object_key}?{query}"))
            }
            AssetUrlSource::Presigned(expires_in) => {
                self.resolver.presigned_url(object_key, *expires_in).await
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the MIME type for an extension, falling back to octet-stream.
#[must_use]
pub fn content_type_for(ext: &str) -> &'static str {
    mime_guess::from_ext(ext.trim_start_matches('.')).first_raw().unwrap_or(FALLBACK_CONTENT_TYPE)
}

/// Returns an object's last-modified time as ISO-8601, consulting `head`
/// when `known` is absent and falling back to the current time.
pub(crate) async fn object_timestamp(
    store: &dyn BlobStore,
    object_key: &str,
    known: Option<SystemTime>,
    logger: &Logger,
) -> Result<String, ServiceError> {
    let last_modified = match known {
        Some(time) => Some(time),
        None => match store.head(object_key).await {
            Ok(metadata) => metadata.last_modified,
            Err(err) => {
                logger.warn(COMPONENT, format!("head {object_key} failed: {err}"));
                None
            }
        },
    };
    let time = last_modified.unwrap_or_else(|| {
        logger.emit(
            &LogEvent::new(
                "timestamp_fallback",
                LogLevel::Warn,
                COMPONENT,
                "last-modified unavailable, using current time",
            )
            .with_field("key", object_key),
        );
        SystemTime::now()
    });
    iso_timestamp(time).map_err(|err| ServiceError::Backend(err.to_string()))
}

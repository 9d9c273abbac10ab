// crates/update-relay-server/src/service.rs
// ============================================================================
// Module: Update Service
// Description: Request orchestration from validated request to response.
// Purpose: Resolve the latest bundle, apply the gate, and package the answer.
// Dependencies: update-relay-core, update-relay-storage
// ============================================================================

//! ## Overview
//! [`UpdateService::handle`] runs one manifest request: resolve the newest
//! bundle, classify it, evaluate the update-type gate against the client's
//! state, then build and package a manifest or directive. Signing, when
//! expected, covers the exact JSON bytes placed in the response part.
//! `noUpdateAvailable` is a successful outcome, never an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use update_relay_core::BundlePath;
use update_relay_core::ClientState;
use update_relay_core::Directive;
use update_relay_core::GateOutcome;
use update_relay_core::GateSubject;
use update_relay_core::LogEvent;
use update_relay_core::LogLevel;
use update_relay_core::Logger;
use update_relay_core::Platform;
use update_relay_core::RuntimeVersion;
use update_relay_core::UpdateType;
use update_relay_core::policy;
use update_relay_storage::BlobStore;

use crate::assembler::AssetUrlSource;
use crate::assembler::ManifestAssembler;
use crate::cache::MetadataCache;
use crate::directives;
use crate::directives::DirectiveBuilder;
use crate::error::ServiceError;
use crate::packager;
use crate::packager::ResponsePackage;
use crate::request::ManifestRequest;
use crate::resolver::UpdateResolver;
use crate::signing::CodeSigner;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Log component for the service.
const COMPONENT: &str = "service";
/// Object size limit used by [`ServiceOptions::public_host`].
pub const DEFAULT_MAX_OBJECT_BYTES: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Service settings derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Asset URL source.
    pub asset_urls: AssetUrlSource,
    /// Largest object read into memory.
    pub max_object_bytes: usize,
    /// Headers clients send when downloading each asset.
    pub asset_request_headers: BTreeMap<String, String>,
}

impl ServiceOptions {
    /// Creates options serving assets from `public_host`.
    #[must_use]
    pub fn public_host(host: impl Into<String>) -> Self {
        Self {
            asset_urls: AssetUrlSource::PublicHost(host.into()),
            max_object_bytes: DEFAULT_MAX_OBJECT_BYTES,
            asset_request_headers: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Latest bundle for a runtime version and platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Newest bundle path.
    pub bundle: BundlePath,
    /// Bundle classification.
    pub update_type: UpdateType,
    /// Manifest id for normal bundles.
    pub update_id: Option<String>,
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Serves manifest requests.
pub struct UpdateService {
    /// Shared result cache.
    cache: Arc<MetadataCache>,
    /// Latest-bundle resolver.
    resolver: UpdateResolver,
    /// Manifest assembler.
    assembler: ManifestAssembler,
    /// Directive builder.
    directives: DirectiveBuilder,
    /// Optional code signer.
    signer: CodeSigner,
    /// Per-asset request headers for the extensions part.
    asset_request_headers: BTreeMap<String, String>,
    /// Diagnostics logger.
    logger: Logger,
}

impl UpdateService {
    /// Wires the service around a store and shared cache.
    #[must_use]
    pub fn new(
        store: Arc<dyn BlobStore>,
        cache: Arc<MetadataCache>,
        signer: CodeSigner,
        options: ServiceOptions,
        logger: Logger,
    ) -> Self {
        let resolver = UpdateResolver::new(Arc::clone(&store), Arc::clone(&cache));
        let assembler = ManifestAssembler::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            options.asset_urls,
            options.max_object_bytes,
            logger.clone(),
        );
        let directives = DirectiveBuilder::new(
            store,
            Arc::clone(&cache),
            options.max_object_bytes,
            logger.clone(),
        );
        Self {
            cache,
            resolver,
            assembler,
            directives,
            signer,
            asset_request_headers: options.asset_request_headers,
            logger,
        }
    }

    /// Returns the shared cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Returns the resolver.
    #[must_use]
    pub const fn resolver(&self) -> &UpdateResolver {
        &self.resolver
    }

    /// Returns the assembler.
    #[must_use]
    pub const fn assembler(&self) -> &ManifestAssembler {
        &self.assembler
    }

    /// Resolves the newest bundle and, for normal bundles, its manifest id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when nothing is published and
    /// [`ServiceError::Backend`] when storage fails.
    pub async fn resolve(
        &self,
        runtime_version: &RuntimeVersion,
        platform: Platform,
    ) -> Result<Resolution, ServiceError> {
        let bundle = self.resolver.resolve_latest_bundle(runtime_version).await?;
        let update_type = self.resolver.classify(&bundle).await?;
        let update_id = match update_type {
            UpdateType::Normal => {
                let metadata = self.assembler.load_metadata(&bundle, runtime_version).await?;
                if metadata.descriptor.platform(platform).is_none() {
                    return Err(ServiceError::NotFound(format!(
                        "No {platform} files in update {bundle}"
                    )));
                }
                Some(metadata.id)
            }
            UpdateType::Rollback => None,
        };
        Ok(Resolution {
            bundle,
            update_type,
            update_id,
        })
    }

    /// Handles one validated manifest request.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] for missing bundles, protocol violations,
    /// signing without a key, and storage failures.
    pub async fn handle(&self, request: &ManifestRequest) -> Result<ResponsePackage, ServiceError> {
        let runtime_version = &request.runtime_version;
        let bundle = self.resolver.resolve_latest_bundle(runtime_version).await?;
        let client = ClientState {
            protocol: request.protocol,
            current_update_id: request.current_update_id.as_deref(),
            embedded_update_id: request.embedded_update_id.as_deref(),
        };
        let (outcome, metadata) = match self.resolver.classify(&bundle).await? {
            UpdateType::Normal => {
                let metadata = self.assembler.load_metadata(&bundle, runtime_version).await?;
                let subject = GateSubject::Normal {
                    latest_update_id: &metadata.id,
                };
                (policy::evaluate(subject, client)?, Some(metadata))
            }
            UpdateType::Rollback => (policy::evaluate(GateSubject::Rollback, client)?, None),
        };
        let package = match outcome {
            GateOutcome::ServeManifest => {
                self.signer.ensure_available(request.expect_signature)?;
                let metadata = match metadata {
                    Some(metadata) => metadata,
                    None => self.assembler.load_metadata(&bundle, runtime_version).await?,
                };
                let manifest = self
                    .assembler
                    .assemble(&bundle, runtime_version, request.platform, &metadata)
                    .await?;
                let manifest_json = packager::payload_bytes(&manifest)?;
                let signature =
                    self.signer.sign_if_expected(request.expect_signature, &manifest_json)?;
                let extensions =
                    packager::asset_request_headers(&manifest, &self.asset_request_headers);
                packager::package_manifest(
                    manifest_json,
                    &extensions,
                    signature.as_deref(),
                    request.protocol,
                )?
            }
            GateOutcome::RollBackToEmbedded => {
                self.signer.ensure_available(request.expect_signature)?;
                let directive = self.directives.build_rollback(&bundle).await?;
                self.package_directive(&directive, request)?
            }
            GateOutcome::NoUpdateAvailable => {
                policy::ensure_no_update_supported(request.protocol)?;
                self.package_directive(&directives::no_update_available(), request)?
            }
        };
        self.logger.emit(
            &LogEvent::new("update_served", LogLevel::Debug, COMPONENT, "update response built")
                .with_field("runtime_version", runtime_version.as_str())
                .with_field("platform", request.platform.as_str())
                .with_field("bundle", bundle.as_str())
                .with_field("response", package.kind.as_str()),
        );
        Ok(package)
    }

    /// Serializes, optionally signs, and packages a directive.
    fn package_directive(
        &self,
        directive: &Directive,
        request: &ManifestRequest,
    ) -> Result<ResponsePackage, ServiceError> {
        let directive_json = packager::payload_bytes(directive)?;
        let signature = self.signer.sign_if_expected(request.expect_signature, &directive_json)?;
        packager::package_directive(directive, directive_json, signature.as_deref())
    }
}

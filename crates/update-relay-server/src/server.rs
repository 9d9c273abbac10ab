// crates/update-relay-server/src/server.rs
// ============================================================================
// Module: HTTP Server
// Description: axum surface for the manifest endpoint.
// Purpose: Serve `GET /api/manifest` with request timeouts and access logs.
// Dependencies: axum, tokio, update-relay-config, update-relay-storage
// ============================================================================

//! ## Overview
//! [`UpdateRelayServer`] wires configuration into an [`UpdateService`] and
//! exposes it over HTTP. Every failure becomes a JSON `{"error": ...}` body
//! whose status follows the configured [`StatusMapping`]. Each request emits
//! one `http_request` log event. Security posture: request headers and query
//! parameters are untrusted and validated before any storage access.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::RawQuery;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use update_relay_config::AssetUrlMode;
use update_relay_config::LogSinkKind;
use update_relay_config::LoggingConfig;
use update_relay_config::RelayConfig;
use update_relay_config::ServerConfig;
use update_relay_config::StatusMapping;
use update_relay_core::FileLogSink;
use update_relay_core::LogEvent;
use update_relay_core::LogLevel;
use update_relay_core::LogSink;
use update_relay_core::Logger;
use update_relay_core::NoopLogSink;
use update_relay_core::StderrLogSink;
use update_relay_storage::BlobStore;
use update_relay_storage::StorageDeps;
use update_relay_storage::connect_blob_store;

use crate::assembler::AssetUrlSource;
use crate::cache::CacheTtls;
use crate::cache::MetadataCache;
use crate::error::ServiceError;
use crate::packager::ResponsePackage;
use crate::request::ManifestRequest;
use crate::service::ServiceOptions;
use crate::service::UpdateService;
use crate::signing::CodeSigner;
use crate::signing::SigningKey;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Manifest endpoint path.
pub const MANIFEST_PATH: &str = "/api/manifest";
/// Log component for the HTTP surface.
const COMPONENT: &str = "http";
/// Client message for requests exceeding the timeout.
const TIMEOUT_MESSAGE: &str = "request timed out";

// ============================================================================
// SECTION: Server State
// ============================================================================

/// Shared state behind every request.
pub struct ServerState {
    /// Update service.
    service: UpdateService,
    /// Status mapping for protocol and backend failures.
    status_mapping: StatusMapping,
    /// Per-request timeout.
    request_timeout: Duration,
    /// Access and failure logger.
    logger: Logger,
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Client-visible message.
    error: String,
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Update relay HTTP server.
pub struct UpdateRelayServer {
    /// Address bound by [`UpdateRelayServer::serve`].
    bind: String,
    /// Shared request state.
    state: Arc<ServerState>,
}

impl UpdateRelayServer {
    /// Builds a server from validated configuration, connecting storage and
    /// loading the signing key.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration is invalid, the log sink or
    /// signing key cannot be opened, or storage cannot be reached.
    pub async fn from_config(mut config: RelayConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let logger = build_logger(&config.logging)?;
        let deps = StorageDeps::new(logger.clone());
        let store = connect_blob_store(&config.storage, &deps)
            .await
            .map_err(|err| ServerError::Init(err.to_string()))?;
        let signer = match &config.signing.private_key_path {
            Some(path) => CodeSigner::new(Some(
                SigningKey::load(path).map_err(|err| ServerError::Init(err.to_string()))?,
            )),
            None => {
                logger.info(COMPONENT, "no signing key configured; signed requests will fail");
                CodeSigner::disabled()
            }
        };
        let cache = Arc::new(MetadataCache::new(CacheTtls::from(&config.cache)));
        let options = service_options(&config);
        let service = UpdateService::new(store, cache, signer, options, logger.clone());
        Ok(Self::new(service, &config.server, logger))
    }

    /// Wraps an already wired service.
    #[must_use]
    pub fn new(service: UpdateService, server: &ServerConfig, logger: Logger) -> Self {
        Self {
            bind: server.bind.clone(),
            state: Arc::new(ServerState {
                service,
                status_mapping: server.status_mapping,
                request_timeout: server.request_timeout(),
                logger,
            }),
        }
    }

    /// Returns the update service.
    #[must_use]
    pub fn service(&self) -> &UpdateService {
        &self.state.service
    }

    /// Returns the axum router for this server.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(MANIFEST_PATH, get(handle_manifest))
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.bind)
            .await
            .map_err(|err| ServerError::Transport(format!("bind {} failed: {err}", self.bind)))?;
        let logger = self.state.logger.clone();
        logger.emit(
            &LogEvent::new("server_started", LogLevel::Info, COMPONENT, "update relay listening")
                .with_field("bind", self.bind.as_str()),
        );
        self.serve_with_listener(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
        logger.info(COMPONENT, "update relay stopped");
        Ok(())
    }

    /// Serves on an existing listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when the server fails.
    pub async fn serve_with_listener<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
    }
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

/// Builds the logger selected by configuration.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the log file cannot be opened.
pub fn build_logger(config: &LoggingConfig) -> Result<Logger, ServerError> {
    let sink: Arc<dyn LogSink> = match config.sink {
        LogSinkKind::Stderr => Arc::new(StderrLogSink),
        LogSinkKind::None => Arc::new(NoopLogSink),
        LogSinkKind::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| ServerError::Config("logging.path is required".to_string()))?;
            let sink = FileLogSink::new(path).map_err(|err| {
                ServerError::Init(format!("open log file {}: {err}", path.display()))
            })?;
            Arc::new(sink)
        }
    };
    Ok(Logger::new(sink, config.level))
}

/// Derives service options from configuration.
#[must_use]
pub fn service_options(config: &RelayConfig) -> ServiceOptions {
    let asset_urls = match config.server.asset_url_mode {
        AssetUrlMode::PublicHost => AssetUrlSource::PublicHost(config.server.public_host.clone()),
        AssetUrlMode::Presigned => {
            AssetUrlSource::Presigned(Duration::from_secs(config.server.presign_expires_secs))
        }
    };
    ServiceOptions {
        asset_urls,
        max_object_bytes: config.storage.max_object_bytes,
        asset_request_headers: config.server.asset_request_headers.clone(),
    }
}

/// Wires an [`UpdateService`] over an explicit store, used by tooling that
/// already holds a connected store.
#[must_use]
pub fn service_for_store(
    config: &RelayConfig,
    store: Arc<dyn BlobStore>,
    signer: CodeSigner,
    logger: Logger,
) -> UpdateService {
    let cache = Arc::new(MetadataCache::new(CacheTtls::from(&config.cache)));
    UpdateService::new(store, cache, signer, service_options(config), logger)
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `GET /api/manifest`.
async fn handle_manifest(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let started = Instant::now();
    let query: HashMap<String, String> = raw_query
        .map(|raw| url::form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let result = match ManifestRequest::from_parts(&headers, &query) {
        Ok(request) => {
            match tokio::time::timeout(state.request_timeout, state.service.handle(&request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Backend(TIMEOUT_MESSAGE.to_string())),
            }
        }
        Err(err) => Err(err),
    };
    let (status, response) = match result {
        Ok(package) => (StatusCode::OK, package_response(package)),
        Err(err) => {
            let status = err.status(state.status_mapping);
            log_failure(&state.logger, &err, status);
            let body = ErrorBody {
                error: err.to_string(),
            };
            (status, (status, Json(body)).into_response())
        }
    };
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    state.logger.emit(
        &LogEvent::new("http_request", LogLevel::Info, COMPONENT, "request completed")
            .with_field("method", "GET")
            .with_field("path", MANIFEST_PATH)
            .with_field("status", status.as_u16())
            .with_field("duration_ms", duration_ms),
    );
    response
}

/// Converts a rendered package into an HTTP 200 response.
fn package_response(package: ResponsePackage) -> Response {
    (StatusCode::OK, package.headers, package.body).into_response()
}

/// Logs a failed request at a level matching its cause.
fn log_failure(logger: &Logger, err: &ServiceError, status: StatusCode) {
    let level = match err {
        ServiceError::Backend(_) => LogLevel::Error,
        _ => LogLevel::Warn,
    };
    logger.emit(
        &LogEvent::new("request_failed", level, COMPONENT, err.to_string())
            .with_field("status", status.as_u16()),
    );
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server startup and transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

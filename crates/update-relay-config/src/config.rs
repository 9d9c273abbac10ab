// crates/update-relay-config/src/config.rs
// ============================================================================
// Module: Update Relay Configuration
// Description: Configuration loading and validation for the update relay.
// Purpose: Provide strict, fail-closed config parsing with environment fallbacks.
// Dependencies: update-relay-core, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from `update-relay.toml` (or an explicit path),
//! overlaid with storage credentials from the environment when the file omits
//! them, and validated before use. Unknown keys are rejected. Every TTL and
//! timeout must be positive, endpoints must declare their scheme, and plain
//! HTTP storage endpoints require an explicit opt-in.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use update_relay_core::LogLevel;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config file name.
pub const DEFAULT_CONFIG_NAME: &str = "update-relay.toml";
/// Environment variable for config path override.
pub const CONFIG_ENV_VAR: &str = "UPDATE_RELAY_CONFIG";
/// Environment variable supplying the storage access key.
pub const ACCESS_KEY_ENV_VAR: &str = "UPDATE_RELAY_STORAGE_ACCESS_KEY";
/// Environment variable supplying the storage secret key.
pub const SECRET_KEY_ENV_VAR: &str = "UPDATE_RELAY_STORAGE_SECRET_KEY";
/// Maximum config file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of per-asset request headers.
pub(crate) const MAX_ASSET_REQUEST_HEADERS: usize = 32;
/// Longest presign expiry accepted by S3-compatible backends (7 days).
pub(crate) const MAX_PRESIGN_EXPIRES_SECS: u64 = 7 * 24 * 60 * 60;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Manifest signing settings.
    #[serde(default)]
    pub signing: SigningConfig,
    /// Blob storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata cache TTLs.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Structured logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Path the config was loaded from, when loaded from disk.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl RelayConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path is `path` when given, else `$UPDATE_RELAY_CONFIG`, else
    /// `update-relay.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::parse(content)?;
        config.apply_env_fallback(|name| env::var(name).ok());
        config.source_path = Some(resolved);
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML without environment overlay or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Fills missing storage credentials from an environment lookup.
    pub fn apply_env_fallback<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.storage.access_key.is_none() {
            self.storage.access_key = lookup(ACCESS_KEY_ENV_VAR).filter(|v| !v.trim().is_empty());
        }
        if self.storage.secret_key.is_none() {
            self.storage.secret_key = lookup(SECRET_KEY_ENV_VAR).filter(|v| !v.trim().is_empty());
        }
    }

    /// Validates the configuration, normalizing values where noted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.signing.validate()?;
        self.storage.validate()?;
        self.cache.validate()?;
        self.logging.validate()?;
        if self.server.asset_url_mode == AssetUrlMode::Presigned
            && self.storage.provider == StorageProvider::DogeCloud
        {
            return Err(ConfigError::Invalid(
                "server.asset_url_mode = \"presigned\" requires a storage provider with presign \
                 support"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Server Config
// ============================================================================

/// HTTP status mapping for protocol and backend failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMapping {
    /// Protocol and backend failures answer 404, matching deployed clients.
    #[default]
    Compat,
    /// Protocol failures answer 400 and backend failures answer 500.
    Strict,
}

/// Source of asset download URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetUrlMode {
    /// URLs are built from `server.public_host`.
    #[default]
    PublicHost,
    /// URLs are presigned storage GET URLs.
    Presigned,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public origin prefixed to asset URLs.
    #[serde(default = "default_public_host")]
    pub public_host: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Status mapping for protocol and backend failures.
    #[serde(default)]
    pub status_mapping: StatusMapping,
    /// Source of asset download URLs.
    #[serde(default)]
    pub asset_url_mode: AssetUrlMode,
    /// Expiry of presigned asset URLs in seconds.
    #[serde(default = "default_presign_expires_secs")]
    pub presign_expires_secs: u64,
    /// Headers clients must send when downloading each asset.
    #[serde(default = "default_asset_request_headers")]
    pub asset_request_headers: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_host: default_public_host(),
            request_timeout_ms: default_request_timeout_ms(),
            status_mapping: StatusMapping::default(),
            asset_url_mode: AssetUrlMode::default(),
            presign_expires_secs: default_presign_expires_secs(),
            asset_request_headers: default_asset_request_headers(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(format!("server.bind is not a socket address: {}", self.bind))
            })
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validates server settings.
    fn validate(&mut self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        let trimmed = self.public_host.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&trimmed)
            .map_err(|err| {
                ConfigError::Invalid(format!("server.public_host is not a url: {err}"))
            })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(
                "server.public_host must include http:// or https://".to_string(),
            ));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(ConfigError::Invalid(
                "server.public_host must not carry a query or fragment".to_string(),
            ));
        }
        self.public_host = trimmed;
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.presign_expires_secs == 0 || self.presign_expires_secs > MAX_PRESIGN_EXPIRES_SECS {
            return Err(ConfigError::Invalid(format!(
                "server.presign_expires_secs must be between 1 and {MAX_PRESIGN_EXPIRES_SECS}"
            )));
        }
        if self.asset_request_headers.len() > MAX_ASSET_REQUEST_HEADERS {
            return Err(ConfigError::Invalid(format!(
                "server.asset_request_headers exceeds {MAX_ASSET_REQUEST_HEADERS} entries"
            )));
        }
        for (name, value) in &self.asset_request_headers {
            let name_ok =
                !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic() && b != b':');
            if !name_ok {
                return Err(ConfigError::Invalid(format!(
                    "server.asset_request_headers has invalid header name: `{name}`"
                )));
            }
            if value.bytes().any(|b| b.is_ascii_control()) {
                return Err(ConfigError::Invalid(format!(
                    "server.asset_request_headers has invalid value for {name}"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Signing Config
// ============================================================================

/// Manifest signing configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    /// PEM RSA private key, PKCS#1 or PKCS#8. Signing is unavailable when unset.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
}

impl SigningConfig {
    /// Validates signing settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.private_key_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "signing.private_key_path must not be empty".to_string(),
                ));
            }
            validate_path(path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Storage Config
// ============================================================================

/// Supported blob storage providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageProvider {
    /// S3 or an S3-compatible service.
    #[default]
    S3,
    /// DogeCloud storage with issued temporary credentials.
    #[serde(rename = "dogecloud")]
    DogeCloud,
}

impl StorageProvider {
    /// Returns the config spelling of the provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::DogeCloud => "dogecloud",
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Provider selection.
    #[serde(default)]
    pub provider: StorageProvider,
    /// Bucket name. For DogeCloud, selects among the issued buckets.
    #[serde(default)]
    pub bucket: String,
    /// Optional region (defaults to the environment).
    #[serde(default)]
    pub region: Option<String>,
    /// Optional S3-compatible endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Force path-style addressing.
    #[serde(default)]
    pub force_path_style: bool,
    /// Allow non-TLS endpoints (explicit opt-in).
    #[serde(default)]
    pub allow_http: bool,
    /// Access key; falls back to `UPDATE_RELAY_STORAGE_ACCESS_KEY`.
    #[serde(default)]
    pub access_key: Option<String>,
    /// Secret key; falls back to `UPDATE_RELAY_STORAGE_SECRET_KEY`.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Largest object body read into memory.
    #[serde(default = "default_max_object_bytes")]
    pub max_object_bytes: usize,
    /// DogeCloud-specific settings.
    #[serde(default)]
    pub dogecloud: DogeCloudConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            bucket: String::new(),
            region: None,
            endpoint: None,
            force_path_style: false,
            allow_http: false,
            access_key: None,
            secret_key: None,
            max_object_bytes: default_max_object_bytes(),
            dogecloud: DogeCloudConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Returns static credentials when both keys are present.
    #[must_use]
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) => Some((access.as_str(), secret.as_str())),
            _ => None,
        }
    }

    /// Validates storage settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_object_bytes == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_object_bytes must be greater than zero".to_string(),
            ));
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(ConfigError::Invalid(
                "storage.access_key and storage.secret_key must be set together".to_string(),
            ));
        }
        match self.provider {
            StorageProvider::S3 => {
                if self.bucket.trim().is_empty() {
                    return Err(ConfigError::Invalid("storage.bucket must be set".to_string()));
                }
                if let Some(endpoint) = &self.endpoint {
                    validate_endpoint("storage.endpoint", endpoint, self.allow_http)?;
                }
            }
            StorageProvider::DogeCloud => {
                if self.static_credentials().is_none() {
                    return Err(ConfigError::Invalid(
                        "dogecloud storage requires storage.access_key and storage.secret_key"
                            .to_string(),
                    ));
                }
                self.dogecloud.validate(self.allow_http)?;
            }
        }
        Ok(())
    }
}

/// DogeCloud credential issuance settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DogeCloudConfig {
    /// API origin issuing temporary credentials.
    #[serde(default = "default_dogecloud_api_base")]
    pub api_base: String,
    /// Credential cache key for the issued payload.
    #[serde(default = "default_credential_cache_key")]
    pub credential_cache_key: String,
    /// Credential cache TTL in seconds.
    #[serde(default = "default_credential_cache_ttl_secs")]
    pub credential_cache_ttl_secs: u64,
    /// Timeout for the issuance call in milliseconds.
    #[serde(default = "default_dogecloud_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for DogeCloudConfig {
    fn default() -> Self {
        Self {
            api_base: default_dogecloud_api_base(),
            credential_cache_key: default_credential_cache_key(),
            credential_cache_ttl_secs: default_credential_cache_ttl_secs(),
            request_timeout_ms: default_dogecloud_timeout_ms(),
        }
    }
}

impl DogeCloudConfig {
    /// Validates DogeCloud settings.
    fn validate(&self, allow_http: bool) -> Result<(), ConfigError> {
        validate_endpoint("storage.dogecloud.api_base", &self.api_base, allow_http)?;
        if self.credential_cache_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.dogecloud.credential_cache_key must be set".to_string(),
            ));
        }
        if self.credential_cache_ttl_secs == 0 || self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "storage.dogecloud ttl and timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Cache Config
// ============================================================================

/// Metadata cache TTLs in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Latest bundle resolution.
    pub latest_bundle_secs: u64,
    /// Bundle directory listings.
    pub directory_secs: u64,
    /// Bundle metadata documents.
    pub metadata_secs: u64,
    /// App configuration documents.
    pub app_config_secs: u64,
    /// Per-asset metadata.
    pub asset_secs: u64,
    /// Rollback directives.
    pub rollback_secs: u64,
    /// Positive existence checks.
    pub exists_hit_secs: u64,
    /// Negative existence checks.
    pub exists_miss_secs: u64,
    /// Upper bound for cached presigned URLs.
    pub presign_max_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            latest_bundle_secs: 180,
            directory_secs: 300,
            metadata_secs: 900,
            app_config_secs: 1200,
            asset_secs: 1800,
            rollback_secs: 900,
            exists_hit_secs: 180,
            exists_miss_secs: 60,
            presign_max_secs: 600,
        }
    }
}

impl CacheConfig {
    /// Validates cache settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let entries = [
            ("latest_bundle_secs", self.latest_bundle_secs),
            ("directory_secs", self.directory_secs),
            ("metadata_secs", self.metadata_secs),
            ("app_config_secs", self.app_config_secs),
            ("asset_secs", self.asset_secs),
            ("rollback_secs", self.rollback_secs),
            ("exists_hit_secs", self.exists_hit_secs),
            ("exists_miss_secs", self.exists_miss_secs),
            ("presign_max_secs", self.presign_max_secs),
        ];
        for (name, value) in entries {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("cache.{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Logging Config
// ============================================================================

/// Log sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `logging.path`.
    File,
    /// Discard logs.
    None,
}

/// Structured logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Sink selection.
    #[serde(default)]
    pub sink: LogSinkKind,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Minimum emitted level.
    #[serde(default)]
    pub level: LogLevel,
}

impl LoggingConfig {
    /// Validates logging settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (&self.sink, &self.path) {
            (LogSinkKind::File, None) => {
                Err(ConfigError::Invalid("logging.path is required for the file sink".to_string()))
            }
            (_, Some(path)) => validate_path(path),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

/// Default public host.
fn default_public_host() -> String {
    "http://localhost:3000".to_string()
}

/// Default request timeout.
const fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Default presigned URL lifetime.
const fn default_presign_expires_secs() -> u64 {
    3600
}

/// Default asset request headers.
fn default_asset_request_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("test-header".to_string(), "test-header-value".to_string())])
}

/// Default object size limit.
const fn default_max_object_bytes() -> usize {
    64 * 1024 * 1024
}

/// Default DogeCloud API base.
fn default_dogecloud_api_base() -> String {
    "https://api.dogecloud.com".to_string()
}

/// Default credential cache key.
fn default_credential_cache_key() -> String {
    "dogecloud_data".to_string()
}

/// Default credential cache lifetime.
const fn default_credential_cache_ttl_secs() -> u64 {
    7000
}

/// Default DogeCloud request timeout.
const fn default_dogecloud_timeout_ms() -> u64 {
    10_000
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates a path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates an http(s) endpoint, rejecting plain http without opt-in.
fn validate_endpoint(field: &str, endpoint: &str, allow_http: bool) -> Result<(), ConfigError> {
    let trimmed = endpoint.trim();
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(ConfigError::Invalid(format!("{field} must include http:// or https://")));
    }
    if trimmed.starts_with("http://") && !allow_http {
        return Err(ConfigError::Invalid(format!("{field} uses http:// without allow_http")));
    }
    Ok(())
}

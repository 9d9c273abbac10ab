// crates/update-relay-core/src/model.rs
// ============================================================================
// Module: Update Relay Data Model
// Description: Platforms, protocol versions, bundle paths, manifests, directives.
// Purpose: Provide the typed vocabulary shared by storage and server layers.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! Bundles are published under `updates/<runtimeVersion>/<timestamp>/`. Each
//! bundle carries a `metadata.json` produced by the app export step, an
//! `expoConfig.json` with the app configuration, and optionally a `rollback`
//! marker. The types here model those inputs and the manifest and directive
//! documents served back to clients. Serialized field order matches the
//! protocol documents exactly because signatures cover the serialized bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Root prefix under which all runtime versions are published.
pub const UPDATES_ROOT: &str = "updates";
/// Relative name of the bundle metadata document.
pub const METADATA_FILE: &str = "metadata.json";
/// Relative name of the app configuration document.
pub const APP_CONFIG_FILE: &str = "expoConfig.json";
/// Relative name of the rollback marker object.
pub const ROLLBACK_MARKER: &str = "rollback";
/// Maximum accepted runtime version length.
pub const MAX_RUNTIME_VERSION_LENGTH: usize = 255;

/// ISO-8601 UTC timestamp with millisecond precision.
const ISO_MILLIS: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while parsing or formatting model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Platform value is not `ios` or `android`.
    #[error("unsupported platform: {0}")]
    Platform(String),
    /// Protocol version value is not `0` or `1`.
    #[error("unsupported protocol version: {0}")]
    ProtocolVersion(String),
    /// Runtime version is empty or cannot be used as a path segment.
    #[error("invalid runtime version: {0}")]
    RuntimeVersion(String),
    /// Bundle path does not follow the published layout.
    #[error("invalid bundle path: {0}")]
    BundlePath(String),
    /// Timestamp could not be rendered.
    #[error("timestamp formatting failed: {0}")]
    Timestamp(String),
}

// ============================================================================
// SECTION: Platform
// ============================================================================

/// Client platform requesting an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Apple iOS.
    Ios,
    /// Android.
    Android,
}

impl Platform {
    /// Returns the wire spelling of the platform.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            other => Err(ModelError::Platform(other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Protocol Version
// ============================================================================

/// Update protocol version negotiated by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// Legacy protocol without directives.
    #[default]
    V0,
    /// Protocol with directive support.
    V1,
}

impl ProtocolVersion {
    /// Returns the numeric protocol version.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::V0 => 0,
            Self::V1 => 1,
        }
    }

    /// Returns true when the version supports directive responses.
    #[must_use]
    pub const fn supports_directives(self) -> bool {
        matches!(self, Self::V1)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl FromStr for ProtocolVersion {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "0" => Ok(Self::V0),
            "1" => Ok(Self::V1),
            other => Err(ModelError::ProtocolVersion(other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Runtime Version
// ============================================================================

/// Runtime version string, validated for use as a storage path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RuntimeVersion(String);

impl RuntimeVersion {
    /// Validates and wraps a runtime version.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::RuntimeVersion`] when the value is empty, too
    /// long, a dot segment, or contains separators or control characters.
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let invalid = value.is_empty()
            || value.len() > MAX_RUNTIME_VERSION_LENGTH
            || value == "."
            || value == ".."
            || value.chars().any(|ch| ch == '/' || ch == '\\' || ch.is_control());
        if invalid {
            return Err(ModelError::RuntimeVersion(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the runtime version string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the storage prefix listing every bundle of this runtime version.
    #[must_use]
    pub fn bundles_prefix(&self) -> String {
        format!("{UPDATES_ROOT}/{}/", self.0)
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Bundle Path
// ============================================================================

/// Storage path of one published bundle, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BundlePath(String);

impl BundlePath {
    /// Builds the bundle path for a runtime version and publish timestamp.
    #[must_use]
    pub fn new(runtime_version: &RuntimeVersion, timestamp: u64) -> Self {
        Self(format!("{UPDATES_ROOT}/{}/{timestamp}", runtime_version.as_str()))
    }

    /// Parses an existing bundle path, trimming any trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::BundlePath`] when the path is not
    /// `updates/<runtimeVersion>/<digits>`.
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let trimmed = value.trim_end_matches('/');
        let mut segments = trimmed.split('/');
        let root = segments.next();
        let runtime = segments.next();
        let stamp = segments.next();
        let extra = segments.next();
        match (root, runtime, stamp, extra) {
            (Some(UPDATES_ROOT), Some(runtime), Some(stamp), None)
                if RuntimeVersion::parse(runtime).is_ok()
                    && !stamp.is_empty()
                    && stamp.bytes().all(|b| b.is_ascii_digit()) =>
            {
                Ok(Self(trimmed.to_string()))
            }
            _ => Err(ModelError::BundlePath(value.to_string())),
        }
    }

    /// Returns the bundle path string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the storage key of a file inside the bundle.
    #[must_use]
    pub fn object_key(&self, relative: &str) -> String {
        format!("{}/{}", self.0, relative.trim_start_matches('/'))
    }

    /// Returns the storage key of the bundle metadata document.
    #[must_use]
    pub fn metadata_key(&self) -> String {
        self.object_key(METADATA_FILE)
    }

    /// Returns the storage key of the app configuration document.
    #[must_use]
    pub fn app_config_key(&self) -> String {
        self.object_key(APP_CONFIG_FILE)
    }

    /// Returns the storage key of the rollback marker.
    #[must_use]
    pub fn rollback_key(&self) -> String {
        self.object_key(ROLLBACK_MARKER)
    }

    /// Returns the listing prefix for the bundle directory.
    #[must_use]
    pub fn directory_prefix(&self) -> String {
        format!("{}/", self.0)
    }
}

impl fmt::Display for BundlePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Update Type
// ============================================================================

/// Classification of the latest bundle for a runtime version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
    /// Regular bundle with a manifest.
    Normal,
    /// Bundle directory carries a rollback marker.
    Rollback,
}

// ============================================================================
// SECTION: Bundle Metadata
// ============================================================================

/// Parsed `metadata.json` produced by the export step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BundleDescriptor {
    /// Per-platform file listing.
    #[serde(rename = "fileMetadata")]
    pub file_metadata: BTreeMap<String, PlatformFiles>,
}

impl BundleDescriptor {
    /// Returns the file listing for a platform.
    #[must_use]
    pub fn platform(&self, platform: Platform) -> Option<&PlatformFiles> {
        self.file_metadata.get(platform.as_str())
    }
}

/// Files exported for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlatformFiles {
    /// Relative path of the launch bundle.
    pub bundle: String,
    /// Static assets referenced by the bundle.
    #[serde(default)]
    pub assets: Vec<AssetDescriptor>,
}

/// One exported static asset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetDescriptor {
    /// Relative path of the asset within the bundle.
    pub path: String,
    /// File extension without the leading dot.
    pub ext: String,
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Metadata for one downloadable asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    /// Base64url SHA-256 of the asset bytes, unpadded.
    pub hash: String,
    /// Hex MD5 of the asset bytes.
    pub key: String,
    /// File extension including the leading dot.
    pub file_extension: String,
    /// MIME type of the asset.
    pub content_type: String,
    /// Public download URL.
    pub url: String,
}

/// Extra manifest payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestExtra {
    /// App configuration, carried under the protocol's `expoClient` key.
    #[serde(rename = "expoClient")]
    pub app_config: Value,
}

/// Update manifest served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Deterministic update identifier.
    pub id: String,
    /// Creation timestamp in ISO-8601 UTC.
    pub created_at: String,
    /// Runtime version this update targets.
    pub runtime_version: String,
    /// Non-launch assets.
    pub assets: Vec<AssetMetadata>,
    /// Launch bundle asset.
    pub launch_asset: AssetMetadata,
    /// Free-form metadata, always empty.
    pub metadata: BTreeMap<String, String>,
    /// Extra payload.
    pub extra: ManifestExtra,
}

impl Manifest {
    /// Iterates every other asset in order, then the launch asset.
    pub fn all_assets(&self) -> impl Iterator<Item = &AssetMetadata> {
        self.assets.iter().chain(std::iter::once(&self.launch_asset))
    }
}

// ============================================================================
// SECTION: Directives
// ============================================================================

/// Parameters of a rollback directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackParameters {
    /// Time the rollback was committed, ISO-8601 UTC.
    pub commit_time: String,
}

/// Control message instructing the client instead of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Directive {
    /// Client should revert to its embedded update.
    #[serde(rename = "rollBackToEmbedded")]
    RollBackToEmbedded {
        /// Directive parameters.
        parameters: RollbackParameters,
    },
    /// Client already runs the latest update.
    #[serde(rename = "noUpdateAvailable")]
    NoUpdateAvailable,
}

impl Directive {
    /// Builds a rollback directive for the given commit time.
    #[must_use]
    pub fn roll_back_to_embedded(commit_time: impl Into<String>) -> Self {
        Self::RollBackToEmbedded {
            parameters: RollbackParameters {
                commit_time: commit_time.into(),
            },
        }
    }
}

// ============================================================================
// SECTION: Timestamps
// ============================================================================

/// Formats a timestamp as ISO-8601 UTC with millisecond precision.
///
/// # Errors
///
/// Returns [`ModelError::Timestamp`] when the timestamp cannot be rendered.
pub fn iso_timestamp(value: SystemTime) -> Result<String, ModelError> {
    OffsetDateTime::from(value)
        .format(ISO_MILLIS)
        .map_err(|err| ModelError::Timestamp(err.to_string()))
}

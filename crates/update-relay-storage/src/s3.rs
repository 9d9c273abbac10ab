// crates/update-relay-storage/src/s3.rs
// ============================================================================
// Module: S3 Blob Store
// Description: Blob store adapter for S3 and S3-compatible services.
// Purpose: Serve update bundles from S3 buckets with presign support.
// Dependencies: aws-config, aws-sdk-s3, tokio
// ============================================================================

//! ## Overview
//! [`S3BlobStore`] implements [`BlobStore`] on `aws-sdk-s3`. Credentials are
//! either static (configured keys, optionally with a session token) or
//! resolved by the default AWS provider chain. Custom endpoints and
//! path-style addressing cover S3-compatible services. Object bodies are
//! streamed into memory under a byte limit. Service error codes are mapped
//! onto [`BlobStoreError`] so missing objects and rejected credentials stay
//! distinguishable from other failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::primitives::DateTime;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use update_relay_core::Logger;

use crate::blob::BlobObject;
use crate::blob::BlobStore;
use crate::blob::BlobStoreError;
use crate::blob::ListPage;
use crate::blob::ListRequest;
use crate::blob::ObjectEntry;
use crate::blob::ObjectMetadata;
use crate::blob::validate_object_key;
use crate::blob::validate_prefix;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Log component for this adapter.
const COMPONENT: &str = "storage.s3";
/// Region used when an S3-compatible service ignores regions.
pub const AUTOMATIC_REGION: &str = "automatic";
/// Provider name recorded on static credentials.
const CREDENTIALS_PROVIDER_NAME: &str = "update-relay";
/// Service error codes that indicate rejected or expired credentials.
const UNAUTHORIZED_CODES: &[&str] = &[
    "AccessDenied",
    "ExpiredToken",
    "InvalidAccessKeyId",
    "InvalidToken",
    "SignatureDoesNotMatch",
    "TokenRefreshRequired",
];
/// Read buffer size for streamed bodies.
const READ_CHUNK_BYTES: usize = 8192;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Static access credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    /// Access key identifier.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Optional session token for temporary credentials.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

impl StaticCredentials {
    /// Converts into SDK credentials.
    fn to_sdk(&self) -> Credentials {
        Credentials::new(
            self.access_key.clone(),
            self.secret_key.clone(),
            self.session_token.clone(),
            None,
            CREDENTIALS_PROVIDER_NAME,
        )
    }
}

/// Connection settings for an S3 bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    /// Bucket name.
    pub bucket: String,
    /// Optional region; the provider chain decides when unset.
    pub region: Option<String>,
    /// Optional S3-compatible endpoint.
    pub endpoint: Option<String>,
    /// Force path-style addressing.
    pub force_path_style: bool,
    /// Static credentials; the provider chain decides when unset.
    pub credentials: Option<StaticCredentials>,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// S3-backed blob store.
pub struct S3BlobStore {
    /// Underlying S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Operation logger.
    logger: Logger,
}

impl S3BlobStore {
    /// Connects using the default AWS configuration chain plus overrides.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Invalid`] when the bucket is empty.
    pub async fn connect(settings: &S3Settings, logger: Logger) -> Result<Self, BlobStoreError> {
        if settings.bucket.trim().is_empty() {
            return Err(BlobStoreError::Invalid("bucket must be set".to_string()));
        }
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = settings.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint) = settings.endpoint.clone() {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(credentials) = &settings.credentials {
            loader = loader.credentials_provider(credentials.to_sdk());
        }
        let shared_config = loader.load().await;
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if settings.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        logger.info(COMPONENT, format!("connected to bucket {}", settings.bucket));
        Ok(Self {
            client: Client::from_conf(s3_builder.build()),
            bucket: settings.bucket.clone(),
            logger,
        })
    }

    /// Builds a store from explicit credentials without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Invalid`] when the bucket is empty.
    pub fn with_credentials(
        settings: &S3Settings,
        credentials: &StaticCredentials,
        logger: Logger,
    ) -> Result<Self, BlobStoreError> {
        if settings.bucket.trim().is_empty() {
            return Err(BlobStoreError::Invalid("bucket must be set".to_string()));
        }
        let region = settings.region.clone().unwrap_or_else(|| AUTOMATIC_REGION.to_string());
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(credentials.to_sdk())
            .force_path_style(settings.force_path_style);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }
        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            logger,
        })
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn provider(&self) -> &'static str {
        "s3"
    }

    async fn list(&self, request: &ListRequest) -> Result<ListPage, BlobStoreError> {
        validate_prefix(&request.prefix)?;
        self.logger.debug(COMPONENT, format!("list {}/{}", self.bucket, request.prefix));
        let mut call = self.client.list_objects_v2().bucket(&self.bucket).prefix(&request.prefix);
        if let Some(delimiter) = &request.delimiter {
            call = call.delimiter(delimiter);
        }
        if let Some(max_keys) = request.max_keys {
            call = call.max_keys(max_keys);
        }
        if let Some(token) = &request.continuation_token {
            call = call.continuation_token(token);
        }
        let output = call.send().await.map_err(|err| map_sdk_error(&request.prefix, &err))?;
        let entries = output
            .contents()
            .iter()
            .filter_map(|object| {
                object.key().map(|key| ObjectEntry {
                    key: key.to_string(),
                    size: object.size().and_then(|size| u64::try_from(size).ok()),
                    last_modified: to_system_time(object.last_modified()),
                    etag: object.e_tag().map(str::to_string),
                })
            })
            .collect();
        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|prefix| prefix.prefix().map(str::to_string))
            .collect();
        Ok(ListPage {
            entries,
            common_prefixes,
            truncated: output.is_truncated().unwrap_or(false),
            next_token: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn get(&self, key: &str, max_bytes: usize) -> Result<BlobObject, BlobStoreError> {
        validate_object_key(key)?;
        self.logger.debug(COMPONENT, format!("get {}/{key}", self.bucket));
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error(key, &err))?;
        if let Some(length) = output.content_length() {
            let actual_bytes = usize::try_from(length).unwrap_or(usize::MAX);
            if actual_bytes > max_bytes {
                return Err(BlobStoreError::TooLarge {
                    path: key.to_string(),
                    max_bytes,
                    actual_bytes,
                });
            }
        }
        let metadata = ObjectMetadata {
            content_type: output.content_type().map(str::to_string),
            content_length: output.content_length().and_then(|len| u64::try_from(len).ok()),
            last_modified: to_system_time(output.last_modified()),
            etag: output.e_tag().map(str::to_string),
        };
        let mut reader = output.body.into_async_read();
        let mut buffer = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            let read =
                reader.read(&mut chunk).await.map_err(|err| BlobStoreError::Io(err.to_string()))?;
            if read == 0 {
                break;
            }
            let total_bytes = buffer.len().saturating_add(read);
            if total_bytes > max_bytes {
                return Err(BlobStoreError::TooLarge {
                    path: key.to_string(),
                    max_bytes,
                    actual_bytes: total_bytes,
                });
            }
            buffer.extend_from_slice(&chunk[.. read]);
        }
        Ok(BlobObject {
            body: Bytes::from(buffer),
            metadata,
        })
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BlobStoreError> {
        validate_object_key(key)?;
        self.logger.debug(COMPONENT, format!("put {}/{key}", self.bucket));
        let mut call =
            self.client.put_object().bucket(&self.bucket).key(key).body(ByteStream::from(body));
        if let Some(content_type) = content_type {
            call = call.content_type(content_type);
        }
        call.send().await.map_err(|err| map_sdk_error(key, &err))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        validate_object_key(key)?;
        self.logger.debug(COMPONENT, format!("delete {}/{key}", self.bucket));
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error(key, &err))?;
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<ObjectMetadata, BlobStoreError> {
        validate_object_key(key)?;
        self.logger.debug(COMPONENT, format!("head {}/{key}", self.bucket));
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error(key, &err))?;
        Ok(ObjectMetadata {
            content_type: output.content_type().map(str::to_string),
            content_length: output.content_length().and_then(|len| u64::try_from(len).ok()),
            last_modified: to_system_time(output.last_modified()),
            etag: output.e_tag().map(str::to_string),
        })
    }

    fn supports_presign(&self) -> bool {
        true
    }

    async fn presign(&self, key: &str, expires_in: Duration) -> Result<String, BlobStoreError> {
        validate_object_key(key)?;
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|err| BlobStoreError::Invalid(err.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|err| map_sdk_error(key, &err))?;
        Ok(request.uri().to_string())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts an SDK timestamp to [`SystemTime`].
fn to_system_time(value: Option<&DateTime>) -> Option<SystemTime> {
    value.and_then(|value| SystemTime::try_from(*value).ok())
}

/// Maps an SDK error onto the blob store taxonomy.
fn map_sdk_error<E>(context: &str, err: &SdkError<E, HttpResponse>) -> BlobStoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    match (err.code(), status) {
        (Some("NoSuchKey" | "NotFound"), _) | (None, Some(404)) => {
            BlobStoreError::NotFound(context.to_string())
        }
        (Some(code), _) if UNAUTHORIZED_CODES.contains(&code) => {
            BlobStoreError::Unauthorized(format!("{context}: {code}"))
        }
        (None, Some(401 | 403)) => BlobStoreError::Unauthorized(context.to_string()),
        _ => BlobStoreError::Backend(format!("{context}: {}", DisplayErrorContext(err))),
    }
}

// crates/update-relay-storage/src/dogecloud.rs
// ============================================================================
// Module: DogeCloud Blob Store
// Description: Blob store over DogeCloud buckets using issued temporary keys.
// Purpose: Fetch, cache, and refresh temporary credentials around S3 calls.
// Dependencies: reqwest, ring, serde_json, tokio
// ============================================================================

//! ## Overview
//! DogeCloud hands out short-lived S3 credentials through a signed API call.
//! [`DogeCloudIssuer`] performs that call; [`TemporaryCredentialManager`]
//! shares the issued payload through a [`CredentialCache`] and re-issues it
//! once its `ExpiredAt` time has passed. [`DogeCloudBlobStore`] runs every
//! operation on a session opened from the current credentials and, when
//! the backend rejects them, refreshes once and retries. Sessions come from
//! a [`SessionOpener`]; [`S3SessionOpener`] is the production one.
//! Security posture: the API secret never leaves the process; only its
//! HMAC over the request path and body is sent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use bytes::Bytes;
use ring::hmac;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::RwLock;
use update_relay_config::DogeCloudConfig;
use update_relay_core::LogEvent;
use update_relay_core::LogLevel;
use update_relay_core::Logger;

use crate::blob::BlobObject;
use crate::blob::BlobStore;
use crate::blob::BlobStoreError;
use crate::blob::ListPage;
use crate::blob::ListRequest;
use crate::blob::ObjectMetadata;
use crate::credential_cache::CredentialCache;
use crate::s3::AUTOMATIC_REGION;
use crate::s3::S3BlobStore;
use crate::s3::S3Settings;
use crate::s3::StaticCredentials;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Log component for this adapter.
const COMPONENT: &str = "storage.dogecloud";
/// Issuance API path, also the signed path.
pub const TOKEN_PATH: &str = "/auth/tmp_token.json";
/// Channel requested for object storage access.
const TOKEN_CHANNEL: &str = "OSS_FULL";
/// Scopes requested for object storage access.
const TOKEN_SCOPES: &[&str] = &["*"];
/// Success code in issuance responses.
const SUCCESS_CODE: i64 = 200;

// ============================================================================
// SECTION: Issued Payload
// ============================================================================

/// Temporary S3 credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryCredentials {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token.
    pub session_token: String,
}

impl std::fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Bucket reachable with the issued credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedBucket {
    /// DogeCloud bucket name.
    pub name: String,
    /// Underlying S3 bucket name.
    pub s3_bucket: String,
    /// S3 endpoint serving the bucket.
    pub s3_endpoint: String,
}

/// Issuance payload as returned by the API and stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCredentials {
    /// Temporary credentials.
    #[serde(rename = "Credentials")]
    pub credentials: TemporaryCredentials,
    /// Expiry as Unix seconds.
    #[serde(rename = "ExpiredAt")]
    pub expired_at: u64,
    /// Buckets the credentials grant access to.
    #[serde(rename = "Buckets", default)]
    pub buckets: Vec<IssuedBucket>,
}

impl IssuedCredentials {
    /// Returns true once `now` is past the expiry time.
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        is_past(self.expired_at, now)
    }
}

/// Issuance request body.
#[derive(Serialize)]
struct TokenRequest<'a> {
    /// Access channel.
    channel: &'a str,
    /// Granted scopes.
    scopes: &'a [&'a str],
}

/// Issuance response envelope.
#[derive(Deserialize)]
struct TokenResponse {
    /// API status code; 200 on success.
    code: i64,
    /// API message.
    #[serde(default)]
    msg: String,
    /// Issued payload on success.
    #[serde(default)]
    data: Option<IssuedCredentials>,
}

// ============================================================================
// SECTION: Issuer
// ============================================================================

/// Source of freshly issued temporary credentials.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Issues a new credential payload.
    async fn issue(&self) -> Result<IssuedCredentials, BlobStoreError>;
}

/// Signs an API request as `hex(HMAC-SHA1(secret, path + "\n" + body))`.
#[must_use]
pub fn sign_token_request(secret_key: &str, path: &str, body: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret_key.as_bytes());
    let message = format!("{path}\n{body}");
    hex::encode(hmac::sign(&key, message.as_bytes()).as_ref())
}

/// Issues credentials from the DogeCloud API.
pub struct DogeCloudIssuer {
    /// HTTP client with the issuance timeout.
    client: reqwest::Client,
    /// API origin without a trailing slash.
    api_base: String,
    /// API access key.
    access_key: String,
    /// API secret key.
    secret_key: String,
}

impl DogeCloudIssuer {
    /// Builds an issuer for the configured API origin.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Credential`] when the HTTP client cannot be built.
    pub fn new(
        config: &DogeCloudConfig,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, BlobStoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| BlobStoreError::Credential(format!("http client: {err}")))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        })
    }
}

#[async_trait]
impl CredentialIssuer for DogeCloudIssuer {
    async fn issue(&self) -> Result<IssuedCredentials, BlobStoreError> {
        let body = serde_json::to_string(&TokenRequest {
            channel: TOKEN_CHANNEL,
            scopes: TOKEN_SCOPES,
        })
        .map_err(|err| BlobStoreError::Credential(err.to_string()))?;
        let signature = sign_token_request(&self.secret_key, TOKEN_PATH, &body);
        let response = self
            .client
            .post(format!("{}{TOKEN_PATH}", self.api_base))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(
                reqwest::header::AUTHORIZATION,
                format!("TOKEN {}:{signature}", self.access_key),
            )
            .body(body)
            .send()
            .await
            .map_err(|err| BlobStoreError::Credential(format!("issuance request failed: {err}")))?;
        let status = response.status();
        let envelope: TokenResponse = response.json().await.map_err(|err| {
            BlobStoreError::Credential(format!(
                "issuance response invalid (status {status}): {err}"
            ))
        })?;
        if envelope.code != SUCCESS_CODE {
            return Err(BlobStoreError::Credential(format!(
                "issuance rejected with code {}: {}",
                envelope.code, envelope.msg
            )));
        }
        envelope
            .data
            .ok_or_else(|| BlobStoreError::Credential("issuance response missing data".to_string()))
    }
}

// ============================================================================
// SECTION: Credential Manager
// ============================================================================

/// Shares issued credentials through a credential cache.
pub struct TemporaryCredentialManager {
    /// Issuance source.
    issuer: Arc<dyn CredentialIssuer>,
    /// Shared payload cache.
    cache: Arc<dyn CredentialCache>,
    /// Cache key for the payload.
    cache_key: String,
    /// Cache TTL for the payload.
    cache_ttl: Duration,
    /// Operation logger.
    logger: Logger,
}

impl TemporaryCredentialManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(
        issuer: Arc<dyn CredentialIssuer>,
        cache: Arc<dyn CredentialCache>,
        cache_key: impl Into<String>,
        cache_ttl: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            issuer,
            cache,
            cache_key: cache_key.into(),
            cache_ttl,
            logger,
        }
    }

    /// Returns cached credentials when unexpired, otherwise issues new ones.
    ///
    /// Cache failures fall through to direct issuance.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Credential`] when issuance fails.
    pub async fn current(&self) -> Result<IssuedCredentials, BlobStoreError> {
        match self.cache.get(&self.cache_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<IssuedCredentials>(&raw) {
                Ok(issued) if !issued.is_expired(SystemTime::now()) => return Ok(issued),
                Ok(_) => {
                    self.logger.info(COMPONENT, "cached credentials expired");
                    self.discard_cached().await;
                }
                Err(err) => {
                    self.logger.warn(COMPONENT, format!("cached credentials unreadable: {err}"));
                    self.discard_cached().await;
                }
            },
            Ok(None) => {}
            Err(err) => {
                self.logger.warn(COMPONENT, format!("credential cache read failed: {err}"));
            }
        }
        self.refresh().await
    }

    /// Issues new credentials and stores them in the cache.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Credential`] when issuance fails.
    pub async fn refresh(&self) -> Result<IssuedCredentials, BlobStoreError> {
        let issued = self.issuer.issue().await?;
        self.logger.emit(
            &LogEvent::new("credentials_issued", LogLevel::Info, COMPONENT, "credentials issued")
                .with_field("expired_at", issued.expired_at)
                .with_field("buckets", issued.buckets.len()),
        );
        match serde_json::to_string(&issued) {
            Ok(raw) => {
                if let Err(err) = self.cache.set(&self.cache_key, raw, self.cache_ttl).await {
                    self.logger.warn(COMPONENT, format!("credential cache write failed: {err}"));
                }
            }
            Err(err) => {
                self.logger.warn(COMPONENT, format!("credentials not cacheable: {err}"));
            }
        }
        Ok(issued)
    }

    /// Removes the cached payload, logging failures.
    async fn discard_cached(&self) {
        if let Err(err) = self.cache.delete(&self.cache_key).await {
            self.logger.warn(COMPONENT, format!("credential cache delete failed: {err}"));
        }
    }
}

// ============================================================================
// SECTION: Bucket Selection
// ============================================================================

/// Picks the bucket matching `wanted` by name or S3 name, else the first one.
///
/// # Errors
///
/// Returns [`BlobStoreError::Credential`] when no buckets were issued.
pub fn select_bucket<'a>(
    buckets: &'a [IssuedBucket],
    wanted: &str,
) -> Result<&'a IssuedBucket, BlobStoreError> {
    let wanted = wanted.trim();
    buckets
        .iter()
        .find(|bucket| !wanted.is_empty() && (bucket.name == wanted || bucket.s3_bucket == wanted))
        .or_else(|| buckets.first())
        .ok_or_else(|| BlobStoreError::Credential("issued credentials list no buckets".to_string()))
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Opens a blob store session for one issued bucket.
pub trait SessionOpener: Send + Sync {
    /// Opens a store on `bucket` authenticated with `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError`] when the session cannot be configured.
    fn open(
        &self,
        credentials: &TemporaryCredentials,
        bucket: &IssuedBucket,
    ) -> Result<Arc<dyn BlobStore>, BlobStoreError>;
}

/// Opens S3 sessions against the endpoint each bucket was issued with.
pub struct S3SessionOpener {
    /// Force path-style addressing.
    force_path_style: bool,
    /// Logger handed to each S3 store.
    logger: Logger,
}

impl S3SessionOpener {
    /// Creates an opener.
    #[must_use]
    pub const fn new(force_path_style: bool, logger: Logger) -> Self {
        Self {
            force_path_style,
            logger,
        }
    }
}

impl SessionOpener for S3SessionOpener {
    fn open(
        &self,
        credentials: &TemporaryCredentials,
        bucket: &IssuedBucket,
    ) -> Result<Arc<dyn BlobStore>, BlobStoreError> {
        let settings = S3Settings {
            bucket: bucket.s3_bucket.clone(),
            region: Some(AUTOMATIC_REGION.to_string()),
            endpoint: Some(endpoint_url(&bucket.s3_endpoint)),
            force_path_style: self.force_path_style,
            credentials: None,
        };
        let credentials = StaticCredentials {
            access_key: credentials.access_key_id.clone(),
            secret_key: credentials.secret_access_key.clone(),
            session_token: Some(credentials.session_token.clone()),
        };
        let store = S3BlobStore::with_credentials(&settings, &credentials, self.logger.clone())?;
        Ok(Arc::new(store))
    }
}

/// Session bound to one set of issued credentials.
struct Session {
    /// Store using the issued credentials.
    store: Arc<dyn BlobStore>,
    /// Underlying S3 bucket name.
    s3_bucket: String,
    /// Credential expiry as Unix seconds.
    expired_at: u64,
}

/// DogeCloud-backed blob store.
pub struct DogeCloudBlobStore {
    /// Credential source.
    manager: TemporaryCredentialManager,
    /// Configured bucket name.
    bucket: String,
    /// Session source.
    opener: Arc<dyn SessionOpener>,
    /// Current session.
    session: RwLock<Arc<Session>>,
    /// Operation logger.
    logger: Logger,
}

impl DogeCloudBlobStore {
    /// Obtains credentials and opens the first S3 session.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Credential`] when the initial credentials
    /// cannot be obtained or list no buckets.
    pub async fn connect(
        manager: TemporaryCredentialManager,
        bucket: impl Into<String>,
        force_path_style: bool,
        logger: Logger,
    ) -> Result<Self, BlobStoreError> {
        let opener = Arc::new(S3SessionOpener::new(force_path_style, logger.clone()));
        Self::connect_with(manager, bucket, opener, logger).await
    }

    /// Obtains credentials and opens the first session through `opener`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Credential`] when the initial credentials
    /// cannot be obtained or list no buckets.
    pub async fn connect_with(
        manager: TemporaryCredentialManager,
        bucket: impl Into<String>,
        opener: Arc<dyn SessionOpener>,
        logger: Logger,
    ) -> Result<Self, BlobStoreError> {
        let bucket = bucket.into();
        let issued = manager.current().await?;
        let session = open_session(opener.as_ref(), &issued, &bucket)?;
        logger.info(COMPONENT, format!("connected to bucket {}", session.s3_bucket));
        Ok(Self {
            manager,
            bucket,
            opener,
            session: RwLock::new(Arc::new(session)),
            logger,
        })
    }

    /// Returns the S3 bucket of the current session.
    pub async fn s3_bucket(&self) -> String {
        self.session.read().await.s3_bucket.clone()
    }

    /// Returns the current session, refreshing it when expired.
    async fn active_session(&self) -> Result<Arc<Session>, BlobStoreError> {
        let session = Arc::clone(&*self.session.read().await);
        if is_past(session.expired_at, SystemTime::now()) {
            self.logger.info(COMPONENT, "session credentials expired");
            return self.replace_session(&session).await;
        }
        Ok(session)
    }

    /// Replaces `stale` with a session on newly issued credentials.
    async fn replace_session(&self, stale: &Arc<Session>) -> Result<Arc<Session>, BlobStoreError> {
        let mut guard = self.session.write().await;
        if !Arc::ptr_eq(&guard, stale) {
            return Ok(Arc::clone(&guard));
        }
        let issued = self.manager.refresh().await?;
        let fresh = Arc::new(open_session(self.opener.as_ref(), &issued, &self.bucket)?);
        *guard = Arc::clone(&fresh);
        Ok(fresh)
    }

    /// Runs `op` on the active session, retrying once after a credential rejection.
    async fn with_session<T, F, Fut>(&self, op: F) -> Result<T, BlobStoreError>
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, BlobStoreError>> + Send,
        T: Send,
    {
        let session = self.active_session().await?;
        match op(Arc::clone(&session)).await {
            Err(BlobStoreError::Unauthorized(message)) => {
                self.logger.warn(COMPONENT, format!("credentials rejected, refreshing: {message}"));
                let fresh = self.replace_session(&session).await?;
                op(fresh).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl BlobStore for DogeCloudBlobStore {
    fn provider(&self) -> &'static str {
        "dogecloud"
    }

    async fn list(&self, request: &ListRequest) -> Result<ListPage, BlobStoreError> {
        self.with_session(|session| async move { session.store.list(request).await }).await
    }

    async fn get(&self, key: &str, max_bytes: usize) -> Result<BlobObject, BlobStoreError> {
        self.with_session(|session| async move { session.store.get(key, max_bytes).await }).await
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BlobStoreError> {
        self.with_session(|session| {
            let body = body.clone();
            async move { session.store.put(key, body, content_type).await }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        self.with_session(|session| async move { session.store.delete(key).await }).await
    }

    async fn head(&self, key: &str) -> Result<ObjectMetadata, BlobStoreError> {
        self.with_session(|session| async move { session.store.head(key).await }).await
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens a session on the bucket selected from `issued`.
fn open_session(
    opener: &dyn SessionOpener,
    issued: &IssuedCredentials,
    wanted_bucket: &str,
) -> Result<Session, BlobStoreError> {
    let bucket = select_bucket(&issued.buckets, wanted_bucket)?;
    Ok(Session {
        store: opener.open(&issued.credentials, bucket)?,
        s3_bucket: bucket.s3_bucket.clone(),
        expired_at: issued.expired_at,
    })
}

/// Adds an https scheme to bare endpoint hosts.
fn endpoint_url(endpoint: &str) -> String {
    if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

/// Returns true when `now` is past the Unix-seconds `deadline`.
fn is_past(deadline: u64, now: SystemTime) -> bool {
    now.duration_since(UNIX_EPOCH).map(|since| since.as_secs() > deadline).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_adds_missing_scheme() {
        assert_eq!(endpoint_url("cos.example.com"), "https://cos.example.com");
        assert_eq!(endpoint_url("http://127.0.0.1:9000"), "http://127.0.0.1:9000");
    }

    #[test]
    fn is_past_compares_whole_seconds() {
        let now = UNIX_EPOCH + Duration::from_secs(100);
        assert!(is_past(99, now));
        assert!(!is_past(100, now));
        assert!(!is_past(101, now));
    }
}

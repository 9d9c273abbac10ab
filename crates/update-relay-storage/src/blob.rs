// crates/update-relay-storage/src/blob.rs
// ============================================================================
// Module: Blob Store Port
// Description: Async object-storage interface and shared value types.
// Purpose: Decouple update resolution from any particular storage backend.
// Dependencies: async-trait, bytes
// ============================================================================

//! ## Overview
//! [`BlobStore`] is the bucket-scoped storage interface the update service
//! depends on. Every adapter reports a missing object as
//! [`BlobStoreError::NotFound`] and a missing capability as
//! [`BlobStoreError::Unsupported`], so callers can tell both apart from a
//! backend failure. Object bodies are buffered under an explicit size limit.
//! Security posture: keys reach storage from request input; they are
//! validated for length and traversal before any backend call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single key segment.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total key length.
const MAX_TOTAL_PATH_LENGTH: usize = 1024;
/// Upper bound on pages followed by [`list_all`].
pub const MAX_LIST_PAGES: usize = 100;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Blob store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobStoreError {
    /// Object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),
    /// Backend does not offer the requested capability.
    #[error("operation unsupported: {0}")]
    Unsupported(String),
    /// Invalid configuration or key input.
    #[error("blob store invalid: {0}")]
    Invalid(String),
    /// Backend rejected the request credentials.
    #[error("blob store unauthorized: {0}")]
    Unauthorized(String),
    /// Credential issuance or cache failure.
    #[error("blob store credential error: {0}")]
    Credential(String),
    /// Backend I/O failure.
    #[error("blob store io error: {0}")]
    Io(String),
    /// Backend returned an error.
    #[error("blob store backend error: {0}")]
    Backend(String),
    /// Object exceeds size limits.
    #[error("object too large: {path} ({actual_bytes} > {max_bytes})")]
    TooLarge {
        /// Object path.
        path: String,
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual size in bytes.
        actual_bytes: usize,
    },
}

impl BlobStoreError {
    /// Returns true when the error reports a missing object.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ============================================================================
// SECTION: Value Types
// ============================================================================

/// Listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Key prefix to list.
    pub prefix: String,
    /// Delimiter grouping keys into common prefixes.
    pub delimiter: Option<String>,
    /// Page size limit.
    pub max_keys: Option<i32>,
    /// Continuation token from a previous page.
    pub continuation_token: Option<String>,
}

impl ListRequest {
    /// Lists keys under `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Groups keys by `delimiter`.
    #[must_use]
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Limits the page size.
    #[must_use]
    pub const fn max_keys(mut self, max_keys: i32) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    /// Continues from a previous page.
    #[must_use]
    pub fn continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }
}

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full object key.
    pub key: String,
    /// Object size in bytes.
    pub size: Option<u64>,
    /// Last modification time.
    pub last_modified: Option<SystemTime>,
    /// Entity tag.
    pub etag: Option<String>,
}

/// One page of listing results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects directly under the prefix.
    pub entries: Vec<ObjectEntry>,
    /// Delimiter-grouped sub-prefixes, each ending with the delimiter.
    pub common_prefixes: Vec<String>,
    /// True when more results are available.
    pub truncated: bool,
    /// Token for the next page.
    pub next_token: Option<String>,
}

/// Object metadata returned by `get` and `head`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Content type recorded with the object.
    pub content_type: Option<String>,
    /// Object length in bytes.
    pub content_length: Option<u64>,
    /// Last modification time.
    pub last_modified: Option<SystemTime>,
    /// Entity tag.
    pub etag: Option<String>,
}

/// Object body with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobObject {
    /// Buffered object body.
    pub body: Bytes,
    /// Object metadata.
    pub metadata: ObjectMetadata,
}

// ============================================================================
// SECTION: Blob Store Port
// ============================================================================

/// Bucket-scoped asynchronous object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns a short provider label for logs.
    fn provider(&self) -> &'static str;

    /// Lists one page of objects.
    async fn list(&self, request: &ListRequest) -> Result<ListPage, BlobStoreError>;

    /// Reads an object body of at most `max_bytes`.
    async fn get(&self, key: &str, max_bytes: usize) -> Result<BlobObject, BlobStoreError>;

    /// Writes an object.
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BlobStoreError>;

    /// Deletes an object.
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;

    /// Reads object metadata without the body.
    async fn head(&self, key: &str) -> Result<ObjectMetadata, BlobStoreError>;

    /// Returns true when [`BlobStore::presign`] is available.
    fn supports_presign(&self) -> bool {
        false
    }

    /// Returns a time-limited GET URL for an object.
    async fn presign(&self, key: &str, expires_in: Duration) -> Result<String, BlobStoreError> {
        let _ = expires_in;
        Err(BlobStoreError::Unsupported(format!("{} cannot presign {key}", self.provider())))
    }
}

/// Lists every page for a request, following continuation tokens.
///
/// # Errors
///
/// Returns the first page error, or [`BlobStoreError::Backend`] when the
/// listing exceeds [`MAX_LIST_PAGES`] pages.
pub async fn list_all(
    store: &dyn BlobStore,
    request: &ListRequest,
) -> Result<ListPage, BlobStoreError> {
    let mut merged = ListPage::default();
    let mut next = request.clone();
    for _ in 0 .. MAX_LIST_PAGES {
        let page = store.list(&next).await?;
        merged.entries.extend(page.entries);
        for prefix in page.common_prefixes {
            if !merged.common_prefixes.contains(&prefix) {
                merged.common_prefixes.push(prefix);
            }
        }
        match (page.truncated, page.next_token) {
            (true, Some(token)) => next.continuation_token = Some(token),
            _ => return Ok(merged),
        }
    }
    Err(BlobStoreError::Backend(format!(
        "listing {} exceeded {MAX_LIST_PAGES} pages",
        request.prefix
    )))
}

// ============================================================================
// SECTION: Key Validation
// ============================================================================

/// Validates an object key: relative, no traversal, bounded length.
///
/// # Errors
///
/// Returns [`BlobStoreError::Invalid`] when the key is unsafe.
pub fn validate_object_key(key: &str) -> Result<(), BlobStoreError> {
    if key.is_empty() {
        return Err(BlobStoreError::Invalid("key must be set".to_string()));
    }
    if key.ends_with('/') {
        return Err(BlobStoreError::Invalid(format!("key must not end with '/': {key}")));
    }
    validate_key_path(key)
}

/// Validates a listing prefix; empty prefixes and trailing slashes are allowed.
///
/// # Errors
///
/// Returns [`BlobStoreError::Invalid`] when the prefix is unsafe.
pub fn validate_prefix(prefix: &str) -> Result<(), BlobStoreError> {
    let trimmed = prefix.strip_suffix('/').unwrap_or(prefix);
    if trimmed.is_empty() {
        return Ok(());
    }
    validate_key_path(trimmed)
}

/// Validates a non-empty key path.
fn validate_key_path(path: &str) -> Result<(), BlobStoreError> {
    if path.contains('\\') {
        return Err(BlobStoreError::Invalid("key must not contain backslashes".to_string()));
    }
    if path.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(BlobStoreError::Invalid("key exceeds length limit".to_string()));
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(BlobStoreError::Invalid(format!(
                "key must be relative without traversal: {path}"
            )));
        }
        if segment.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(BlobStoreError::Invalid("key segment exceeds length limit".to_string()));
        }
    }
    Ok(())
}

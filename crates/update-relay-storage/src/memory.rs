// crates/update-relay-storage/src/memory.rs
// ============================================================================
// Module: In-Memory Blob Store
// Description: Process-local blob store with S3-style listing semantics.
// Purpose: Back tests and local runs without a storage service.
// Dependencies: async-trait, bytes
// ============================================================================

//! ## Overview
//! [`InMemoryBlobStore`] keeps objects in a sorted map and emulates
//! delimiter grouping, page limits, and continuation tokens the way S3
//! `ListObjectsV2` does. It can inject a failure into every call and counts
//! calls per operation so callers can observe caching.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

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

/// Page size used when a request does not set one.
const DEFAULT_MAX_KEYS: usize = 1000;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Stored object.
#[derive(Debug, Clone)]
struct StoredObject {
    /// Object body.
    body: Bytes,
    /// Stored content type.
    content_type: Option<String>,
    /// Time of the last write.
    last_modified: SystemTime,
}

impl StoredObject {
    /// Returns the metadata reported by `get` and `head`.
    fn metadata(&self) -> ObjectMetadata {
        ObjectMetadata {
            content_type: self.content_type.clone(),
            content_length: u64::try_from(self.body.len()).ok(),
            last_modified: Some(self.last_modified),
            etag: None,
        }
    }
}

/// Listing item in key order.
enum ListItem {
    /// Object directly under the prefix.
    Object(ObjectEntry),
    /// Folded common prefix.
    Prefix(String),
}

impl ListItem {
    /// Returns the key or prefix used for ordering.
    fn name(&self) -> &str {
        match self {
            Self::Object(entry) => &entry.key,
            Self::Prefix(prefix) => prefix,
        }
    }
}

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    /// `list` calls.
    pub list: usize,
    /// `get` calls.
    pub get: usize,
    /// `head` calls.
    pub head: usize,
    /// `put` calls.
    pub put: usize,
    /// `delete` calls.
    pub delete: usize,
    /// `presign` calls.
    pub presign: usize,
}

/// Atomic per-operation counters.
#[derive(Default)]
struct Counters {
    /// `list` calls.
    list: AtomicUsize,
    /// `get` calls.
    get: AtomicUsize,
    /// `head` calls.
    head: AtomicUsize,
    /// `put` calls.
    put: AtomicUsize,
    /// `delete` calls.
    delete: AtomicUsize,
    /// `presign` calls.
    presign: AtomicUsize,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// In-memory blob store.
#[derive(Default)]
pub struct InMemoryBlobStore {
    /// Objects keyed by full key.
    objects: Mutex<BTreeMap<String, StoredObject>>,
    /// Injected failure returned by every call.
    failure: Mutex<Option<BlobStoreError>>,
    /// Base URL for presigned links; presigning is unsupported when unset.
    presign_base: Option<String>,
    /// Call counters.
    counters: Counters,
}

impl InMemoryBlobStore {
    /// Creates an empty store without presign support.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that presigns URLs under `base`.
    #[must_use]
    pub fn with_presign_base(base: impl Into<String>) -> Self {
        Self {
            presign_base: Some(base.into()),
            ..Self::default()
        }
    }

    /// Stores an object with an explicit modification time.
    pub fn insert(
        &self,
        key: impl Into<String>,
        body: impl Into<Bytes>,
        last_modified: SystemTime,
    ) {
        self.lock_objects().insert(
            key.into(),
            StoredObject {
                body: body.into(),
                content_type: None,
                last_modified,
            },
        );
    }

    /// Makes every subsequent call fail with `error`, or clears the failure.
    pub fn fail_with(&self, error: Option<BlobStoreError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Returns the call counters.
    #[must_use]
    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            list: self.counters.list.load(Ordering::Relaxed),
            get: self.counters.get.load(Ordering::Relaxed),
            head: self.counters.head.load(Ordering::Relaxed),
            put: self.counters.put.load(Ordering::Relaxed),
            delete: self.counters.delete.load(Ordering::Relaxed),
            presign: self.counters.presign.load(Ordering::Relaxed),
        }
    }

    /// Locks the object map, recovering from poisoning.
    fn lock_objects(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts a call and returns the injected failure, if any.
    fn enter(&self, counter: &AtomicUsize) -> Result<(), BlobStoreError> {
        counter.fetch_add(1, Ordering::Relaxed);
        match self.failure.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Collects objects and folded prefixes under the request prefix.
    fn collect_items(&self, request: &ListRequest) -> Vec<ListItem> {
        let objects = self.lock_objects();
        let mut items: Vec<ListItem> = Vec::new();
        for (key, object) in objects.range(request.prefix.clone() ..) {
            let Some(rest) = key.strip_prefix(request.prefix.as_str()) else {
                break;
            };
            let grouped = request
                .delimiter
                .as_deref()
                .filter(|delimiter| !delimiter.is_empty())
                .and_then(|delimiter| {
                    rest.find(delimiter).map(|index| {
                        format!("{}{}", request.prefix, &rest[.. index + delimiter.len()])
                    })
                });
            match grouped {
                Some(prefix) => {
                    let duplicate =
                        matches!(items.last(), Some(ListItem::Prefix(last)) if *last == prefix);
                    if !duplicate {
                        items.push(ListItem::Prefix(prefix));
                    }
                }
                None => items.push(ListItem::Object(ObjectEntry {
                    key: key.clone(),
                    size: u64::try_from(object.body.len()).ok(),
                    last_modified: Some(object.last_modified),
                    etag: None,
                })),
            }
        }
        items
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn provider(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, request: &ListRequest) -> Result<ListPage, BlobStoreError> {
        self.enter(&self.counters.list)?;
        validate_prefix(&request.prefix)?;
        let limit = request
            .max_keys
            .and_then(|max| usize::try_from(max).ok())
            .filter(|max| *max > 0)
            .unwrap_or(DEFAULT_MAX_KEYS);
        let mut page = ListPage::default();
        let mut taken = 0usize;
        let mut last_name: Option<String> = None;
        for item in self.collect_items(request) {
            if let Some(token) = &request.continuation_token {
                if item.name() <= token.as_str() {
                    continue;
                }
            }
            if taken == limit {
                page.truncated = true;
                page.next_token = last_name.clone();
                break;
            }
            last_name = Some(item.name().to_string());
            taken += 1;
            match item {
                ListItem::Object(entry) => page.entries.push(entry),
                ListItem::Prefix(prefix) => page.common_prefixes.push(prefix),
            }
        }
        Ok(page)
    }

    async fn get(&self, key: &str, max_bytes: usize) -> Result<BlobObject, BlobStoreError> {
        self.enter(&self.counters.get)?;
        validate_object_key(key)?;
        let object = self
            .lock_objects()
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))?;
        if object.body.len() > max_bytes {
            return Err(BlobStoreError::TooLarge {
                path: key.to_string(),
                max_bytes,
                actual_bytes: object.body.len(),
            });
        }
        Ok(BlobObject {
            metadata: object.metadata(),
            body: object.body,
        })
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BlobStoreError> {
        self.enter(&self.counters.put)?;
        validate_object_key(key)?;
        self.lock_objects().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.map(str::to_string),
                last_modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        self.enter(&self.counters.delete)?;
        validate_object_key(key)?;
        self.lock_objects().remove(key);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<ObjectMetadata, BlobStoreError> {
        self.enter(&self.counters.head)?;
        validate_object_key(key)?;
        self.lock_objects()
            .get(key)
            .map(StoredObject::metadata)
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    fn supports_presign(&self) -> bool {
        self.presign_base.is_some()
    }

    async fn presign(&self, key: &str, expires_in: Duration) -> Result<String, BlobStoreError> {
        self.enter(&self.counters.presign)?;
        validate_object_key(key)?;
        let base = self
            .presign_base
            .as_deref()
            .ok_or_else(|| BlobStoreError::Unsupported(format!("memory cannot presign {key}")))?;
        Ok(format!("{base}/{key}?expires={}", expires_in.as_secs()))
    }
}

// crates/update-relay-core/src/cache.rs
// ============================================================================
// Module: TTL Cache
// Description: In-process key/value cache with per-entry time-to-live.
// Purpose: Bound repeated storage reads for hot update metadata.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Entries record their insertion instant and TTL. An entry is expired once
//! strictly more than its TTL has elapsed; lookups that find an expired entry
//! evict it and report a miss. Failures are never cached and concurrent
//! misses for the same key may each compute the value. Time is read through a
//! [`Clock`] so tests can advance it deterministically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    /// Reference instant.
    base: Instant,
    /// Elapsed time added by `advance`.
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Advances the clock.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.base + offset
    }
}

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Cached value with its freshness window.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// Cached value.
    pub data: T,
    /// Instant the value was stored.
    pub inserted_at: Instant,
    /// Time-to-live of the value.
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Returns true once strictly more than `ttl` has elapsed since insertion.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > self.ttl
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Thread-safe TTL cache keyed by string.
pub struct TtlCache<T> {
    /// Entries keyed by cache key.
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    /// Time source for expiry.
    clock: Arc<dyn Clock>,
}

impl<T: Clone> TtlCache<T> {
    /// Creates a cache on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a cache on the supplied clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Returns a fresh value, evicting the entry when it has expired.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.data.clone()),
            None => None,
        }
    }

    /// Stores a value, replacing any previous entry.
    ///
    /// Expired entries are swept on every insert, so keys that are never read
    /// again do not accumulate.
    pub fn insert(&self, key: impl Into<String>, data: T, ttl: Duration) {
        let now = self.clock.now();
        let entry = CacheEntry {
            data,
            inserted_at: now,
            ttl,
        };
        let mut entries = self.lock();
        entries.retain(|_, existing| !existing.is_expired(now));
        entries.insert(key.into(), entry);
    }

    /// Removes an entry.
    pub fn remove(&self, key: &str) -> Option<T> {
        self.lock().remove(key).map(|entry| entry.data)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns the number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the cached value or computes, stores, and returns it.
    ///
    /// # Errors
    ///
    /// Returns the compute error unchanged; errors are not cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let value = compute().await?;
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }

    /// Locks the entry map, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

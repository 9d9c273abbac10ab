// crates/update-relay-storage/src/credential_cache.rs
// ============================================================================
// Module: Credential Cache Port
// Description: Key/value cache with TTL for issued storage credentials.
// Purpose: Share issued credentials without binding to a cache technology.
// Dependencies: async-trait, update-relay-core
// ============================================================================

//! ## Overview
//! Adapters that run on short-lived, externally issued credentials store the
//! issuance payload through [`CredentialCache`]. Deployments may back the
//! port with a shared key/value service; [`InMemoryCredentialCache`] keeps
//! payloads in process on the core TTL cache.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use update_relay_core::Clock;
use update_relay_core::TtlCache;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Credential cache failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("credential cache error: {0}")]
pub struct CredentialCacheError(pub String);

// ============================================================================
// SECTION: Port
// ============================================================================

/// String key/value cache with per-entry expiry.
#[async_trait]
pub trait CredentialCache: Send + Sync {
    /// Returns the cached value, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialCacheError>;

    /// Stores a value for `ttl`.
    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CredentialCacheError>;

    /// Removes a value.
    async fn delete(&self, key: &str) -> Result<(), CredentialCacheError>;
}

// ============================================================================
// SECTION: In-Memory Implementation
// ============================================================================

/// Process-local credential cache.
#[derive(Default)]
pub struct InMemoryCredentialCache {
    /// Backing TTL cache.
    entries: TtlCache<String>,
}

impl InMemoryCredentialCache {
    /// Creates an empty cache on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache on the supplied clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: TtlCache::with_clock(clock),
        }
    }
}

#[async_trait]
impl CredentialCache for InMemoryCredentialCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialCacheError> {
        Ok(self.entries.get(key))
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CredentialCacheError> {
        self.entries.insert(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CredentialCacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

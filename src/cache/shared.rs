//! Shared (networked) cache tier.
use std::{sync::Arc, time::Duration};

use crate::{
    assignment::{AssignmentSnapshot, StoredAssignment},
    error::CacheError,
};

use super::{CacheKey, CacheTier};

/// A remote string key-value store visible to every instance, e.g. Redis.
///
/// Every call must give up after `timeout`, reporting [`CacheError::Timeout`].
pub trait SharedStore: Send + Sync {
    fn get(&self, key: &str, timeout: Duration) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, expiring `ttl` after the write regardless of reads.
    fn set(&self, key: &str, value: &str, ttl: Duration, timeout: Duration)
        -> Result<(), CacheError>;

    fn remove(&self, key: &str, timeout: Duration) -> Result<(), CacheError>;
}

/// Cache tier over a [`SharedStore`].
///
/// Snapshots are stored as JSON in the [`StoredAssignment`] shape with absolute expiration.
pub struct SharedTier<S> {
    store: S,
    prefix: String,
    timeout: Duration,
}

impl<S: SharedStore> SharedTier<S> {
    /// Default bound on every call to the shared store.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

    /// Default prefix prepended to every key.
    pub const DEFAULT_PREFIX: &'static str = "toggled:";

    pub fn new(store: S) -> Self {
        SharedTier {
            store,
            prefix: Self::DEFAULT_PREFIX.to_owned(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the key prefix, e.g. to share one store between deployments.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn store_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.prefix, key.encode())
    }
}

impl<S: SharedStore> CacheTier for SharedTier<S> {
    fn name(&self) -> &str {
        "shared"
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Arc<AssignmentSnapshot>>, CacheError> {
        let Some(blob) = self.store.get(&self.store_key(key), self.timeout)? else {
            return Ok(None);
        };
        if blob.trim().is_empty() {
            return Ok(None);
        }

        let stored: StoredAssignment = serde_json::from_str(&blob)
            .map_err(|err| CacheError::Deserialization(Arc::new(err)))?;
        Ok(Some(Arc::new(stored.into())))
    }

    fn set(
        &self,
        key: &CacheKey,
        snapshot: &Arc<AssignmentSnapshot>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let blob = serde_json::to_string(&snapshot.to_stored())
            .map_err(|err| CacheError::Serialization(Arc::new(err)))?;
        self.store
            .set(&self.store_key(key), &blob, ttl, self.timeout)
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.store.remove(&self.store_key(key), self.timeout)
    }
}

//! Tiered cache of assignment snapshots.
//!
//! A [`TieredCache`] is an ordered list of [`CacheTier`]s, each with its own TTL. Lookups walk the
//! tiers in order and backfill earlier tiers on a hit. Writes and removals go through every tier.
//! A tier that fails is treated as a miss and never aborts the lookup.
use std::{sync::Arc, time::Duration};

use derive_more::From;

use crate::{
    assignment::AssignmentSnapshot,
    error::CacheError,
    metrics::{MetricEvent, MetricsRecorder},
    Error, Result,
};

pub mod local;
#[cfg(feature = "redis")]
pub mod redis;
pub mod shared;

/// Identifies an assignment: a flag within an environment.
///
/// Kept structured so that identifiers containing delimiter characters can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, From)]
pub struct CacheKey {
    flag_key: String,
    env_key: String,
}

impl CacheKey {
    pub fn new(flag_key: impl Into<String>, env_key: impl Into<String>) -> Self {
        CacheKey {
            flag_key: flag_key.into(),
            env_key: env_key.into(),
        }
    }

    pub fn flag_key(&self) -> &str {
        &self.flag_key
    }

    pub fn env_key(&self) -> &str {
        &self.env_key
    }

    /// String form for tiers that only accept string keys.
    ///
    /// The flag key is length-prefixed, so distinct keys always encode differently.
    pub fn encode(&self) -> String {
        format!(
            "flag:{}:{}|env:{}",
            self.flag_key.len(),
            self.flag_key,
            self.env_key
        )
    }
}

/// A single cache tier.
///
/// Implementations must be safe to call from many threads at once. Calls that go over the network
/// must be bounded by a timeout.
pub trait CacheTier: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    fn get(&self, key: &CacheKey) -> std::result::Result<Option<Arc<AssignmentSnapshot>>, CacheError>;

    /// Store `snapshot`, replacing any previous entry. `ttl` is interpreted by the tier's
    /// expiration policy.
    fn set(
        &self,
        key: &CacheKey,
        snapshot: &Arc<AssignmentSnapshot>,
        ttl: Duration,
    ) -> std::result::Result<(), CacheError>;

    fn remove(&self, key: &CacheKey) -> std::result::Result<(), CacheError>;
}

struct TierSlot {
    tier: Box<dyn CacheTier>,
    ttl: Duration,
}

/// Ordered list of cache tiers, fastest first.
#[derive(Default)]
pub struct TieredCache {
    tiers: Vec<TierSlot>,
}

impl TieredCache {
    pub fn new() -> Self {
        TieredCache::default()
    }

    /// Append a tier after all existing ones.
    pub fn push(&mut self, tier: impl CacheTier + 'static, ttl: Duration) {
        self.push_boxed(Box::new(tier), ttl);
    }

    pub(crate) fn push_boxed(&mut self, tier: Box<dyn CacheTier>, ttl: Duration) {
        self.tiers.push(TierSlot { tier, ttl });
    }

    /// Look up `key` tier by tier. A hit backfills every earlier tier.
    pub fn get(
        &self,
        key: &CacheKey,
        metrics: &(impl MetricsRecorder + ?Sized),
    ) -> Option<Arc<AssignmentSnapshot>> {
        for (index, slot) in self.tiers.iter().enumerate() {
            let tier = slot.tier.name();
            match slot.tier.get(key) {
                Ok(Some(snapshot)) => {
                    metrics.record(MetricEvent::CacheHit { tier });
                    log::trace!(target: "toggled",
                                flag_key = key.flag_key(),
                                env_key = key.env_key(),
                                tier;
                                "cache hit");
                    self.write(&self.tiers[..index], key, &snapshot);
                    return Some(snapshot);
                }
                Ok(None) => {
                    metrics.record(MetricEvent::CacheMiss { tier });
                }
                Err(err) => {
                    metrics.record(MetricEvent::CacheMiss { tier });
                    log::warn!(target: "toggled",
                               flag_key = key.flag_key(),
                               env_key = key.env_key(),
                               tier;
                               "cache tier failed, treating as miss: {err}");
                }
            }
        }
        None
    }

    /// Write `snapshot` through every tier. Failures are logged and skipped.
    pub fn set(&self, key: &CacheKey, snapshot: &Arc<AssignmentSnapshot>) {
        self.write(&self.tiers, key, snapshot);
    }

    fn write(&self, tiers: &[TierSlot], key: &CacheKey, snapshot: &Arc<AssignmentSnapshot>) {
        for slot in tiers {
            if let Err(err) = slot.tier.set(key, snapshot, slot.ttl) {
                log::warn!(target: "toggled",
                           flag_key = key.flag_key(),
                           env_key = key.env_key(),
                           tier = slot.tier.name();
                           "failed to write cache tier: {err}");
            }
        }
    }

    /// Remove `key` from every tier.
    ///
    /// All tiers are attempted. The first failure, if any, is returned afterwards.
    pub fn remove(&self, key: &CacheKey) -> Result<()> {
        let mut failure = None;
        for slot in &self.tiers {
            if let Err(source) = slot.tier.remove(key) {
                log::warn!(target: "toggled",
                           flag_key = key.flag_key(),
                           env_key = key.env_key(),
                           tier = slot.tier.name();
                           "failed to invalidate cache tier: {source}");
                if failure.is_none() {
                    failure = Some(Error::InvalidationFailed {
                        tier: slot.tier.name().to_owned(),
                        source,
                    });
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }
}

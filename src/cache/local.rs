//! Process-local cache tier.
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::{assignment::AssignmentSnapshot, error::CacheError};

use super::{CacheKey, CacheTier};

struct Entry {
    snapshot: Arc<AssignmentSnapshot>,
    ttl: u64,
    // Nanoseconds since `LocalTier::epoch`. Atomic so that hits can slide it under a read guard.
    expires_at: AtomicU64,
}

impl Entry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.load(Ordering::Relaxed) <= now
    }
}

/// In-memory tier with sliding expiration: every hit pushes the expiry `ttl` further out.
///
/// Visible only within the running process. Readers never block each other, including on the same
/// key, and concurrent writers to the same key resolve as last-writer-wins.
///
/// Expired entries are dropped when read, and swept from the whole map by writes once the
/// shortest pending TTL has elapsed since the previous sweep.
pub struct LocalTier {
    entries: DashMap<CacheKey, Entry>,
    epoch: Instant,
    next_sweep: AtomicU64,
}

impl Default for LocalTier {
    fn default() -> Self {
        LocalTier {
            entries: DashMap::new(),
            epoch: Instant::now(),
            next_sweep: AtomicU64::new(u64::MAX),
        }
    }
}

impl LocalTier {
    pub fn new() -> Self {
        LocalTier::default()
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = self.now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    fn now(&self) -> u64 {
        nanos(self.epoch.elapsed())
    }

    /// Sweep the map if a sweep is due, otherwise make sure one is scheduled within `ttl`.
    fn sweep_if_due(&self, now: u64, ttl: u64) {
        let due = self.next_sweep.load(Ordering::Relaxed);
        if now < due {
            self.next_sweep
                .fetch_min(now.saturating_add(ttl), Ordering::Relaxed);
            return;
        }

        // Only one writer sweeps per interval.
        if self
            .next_sweep
            .compare_exchange(due, now.saturating_add(ttl), Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let before = self.entries.len();
            self.entries.retain(|_, entry| !entry.is_expired(now));
            log::trace!(target: "toggled",
                        swept = before.saturating_sub(self.entries.len());
                        "swept expired local cache entries");
        }
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl CacheTier for LocalTier {
    fn name(&self) -> &str {
        "local"
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Arc<AssignmentSnapshot>>, CacheError> {
        let now = self.now();

        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };

        if entry.is_expired(now) {
            // Release the shard lock before removing.
            drop(entry);
            // Only drop the entry if it wasn't replaced in the meantime.
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            return Ok(None);
        }

        entry
            .expires_at
            .fetch_max(now.saturating_add(entry.ttl), Ordering::Relaxed);
        Ok(Some(entry.snapshot.clone()))
    }

    fn set(
        &self,
        key: &CacheKey,
        snapshot: &Arc<AssignmentSnapshot>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = self.now();
        let ttl = nanos(ttl);
        self.entries.insert(
            key.clone(),
            Entry {
                snapshot: snapshot.clone(),
                ttl,
                expires_at: AtomicU64::new(now.saturating_add(ttl)),
            },
        );
        self.sweep_if_due(now, ttl);
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

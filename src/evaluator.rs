use std::{collections::HashMap, sync::Arc};

use crate::{
    assignment::AssignmentSnapshot,
    bucketer::Bucketer,
    cache::{local::LocalTier, CacheKey, TieredCache},
    context::EvaluationContext,
    metrics::{MetricEvent, MetricsRecorder},
    store::AssignmentStore,
    Error, EvaluationResult, EvaluatorConfig, Result,
};

/// Decides whether flags are enabled, caching assignments across tiers.
///
/// `Evaluator` is `Sync`: share one instance (e.g. behind an `Arc`) between all threads. Neither
/// [`Evaluator::evaluate`] nor [`Evaluator::invalidate_cache`] takes a request-wide lock.
///
/// # Examples
/// ```
/// # use std::collections::HashMap;
/// # use toggled::{EvaluatorConfig, Reason, StoreError, StoredAssignment};
/// fn fetch(flag_key: &str, env_key: &str) -> Result<Option<StoredAssignment>, StoreError> {
///     let found = (flag_key, env_key) == ("new-ui", "prod");
///     Ok(found.then(|| StoredAssignment {
///         is_enabled: true,
///         percentage: None,
///         rules_json: None,
///     }))
/// }
///
/// let evaluator = EvaluatorConfig::from_store(fetch).to_evaluator();
/// let result = evaluator.evaluate("new-ui", "prod", "alice", &HashMap::new()).unwrap();
/// assert!(result.enabled);
/// assert_eq!(result.reason, Reason::Enabled);
/// ```
pub struct Evaluator {
    store: Box<dyn AssignmentStore + Send + Sync>,
    cache: TieredCache,
    metrics: Box<dyn MetricsRecorder + Send + Sync>,
    bucketer: Box<dyn Bucketer + Send + Sync>,
}

impl Evaluator {
    /// Create a new `Evaluator` using the specified configuration.
    pub fn new(config: EvaluatorConfig) -> Self {
        let mut cache = TieredCache::new();
        cache.push(LocalTier::new(), config.local_ttl);
        if let Some(shared) = config.shared_tier {
            cache.push_boxed(shared, config.shared_ttl);
        }
        for (tier, ttl) in config.extra_tiers {
            cache.push_boxed(tier, ttl);
        }

        Evaluator {
            store: config.store,
            cache,
            metrics: config.metrics,
            bucketer: config.bucketer,
        }
    }

    /// Evaluate `flag_key` in `env_key` for `user_id`.
    ///
    /// Returns [`Error::StoreUnavailable`] if the assignment is in no cache tier and the store
    /// cannot be reached. That failure is never reported as a disabled flag.
    pub fn evaluate(
        &self,
        flag_key: &str,
        env_key: &str,
        user_id: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<EvaluationResult> {
        require(flag_key, "flag_key")?;
        require(env_key, "env_key")?;
        require(user_id, "user_id")?;

        let snapshot = self.snapshot(&CacheKey::new(flag_key, env_key))?;

        let context = EvaluationContext::new(user_id, attributes);
        let result = snapshot.eval(flag_key, &context, &*self.bucketer);

        self.metrics.record(MetricEvent::Evaluation);
        log::trace!(target: "toggled",
                    flag_key,
                    env_key,
                    user_id,
                    enabled = result.enabled,
                    reason:display = result.reason;
                    "evaluated a flag");

        Ok(result)
    }

    /// Purge the assignment of `flag_key` in `env_key` from every cache tier.
    ///
    /// Call after every successful write to the assignment. All tiers are attempted even if one
    /// fails; the failure is then reported as [`Error::InvalidationFailed`].
    pub fn invalidate_cache(&self, flag_key: &str, env_key: &str) -> Result<()> {
        require(flag_key, "flag_key")?;
        require(env_key, "env_key")?;

        self.cache.remove(&CacheKey::new(flag_key, env_key))?;
        log::info!(target: "toggled", flag_key, env_key; "cache invalidated");
        Ok(())
    }

    /// Get the assignment from cache, falling back to the store and populating every tier.
    fn snapshot(&self, key: &CacheKey) -> Result<Arc<AssignmentSnapshot>> {
        if let Some(snapshot) = self.cache.get(key, &*self.metrics) {
            return Ok(snapshot);
        }

        self.metrics.record(MetricEvent::StoreFetch);
        let stored = self
            .store
            .fetch_assignment(key.flag_key(), key.env_key())
            .map_err(|err| {
                log::warn!(target: "toggled",
                           flag_key = key.flag_key(),
                           env_key = key.env_key();
                           "failed to fetch assignment: {err}");
                Error::StoreUnavailable(err)
            })?;

        log::debug!(target: "toggled",
                    flag_key = key.flag_key(),
                    env_key = key.env_key(),
                    found = stored.is_some();
                    "fetched assignment");

        let snapshot = Arc::new(
            stored
                .map(AssignmentSnapshot::from)
                .unwrap_or_else(AssignmentSnapshot::absent),
        );
        self.cache.set(key, &snapshot);
        Ok(snapshot)
    }
}

fn require(value: &str, name: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::InvalidArgument(name))
    } else {
        Ok(())
    }
}

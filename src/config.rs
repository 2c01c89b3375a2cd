use std::time::Duration;

use crate::{
    bucketer::{Bucketer, Sha256Bucketer},
    cache::CacheTier,
    metrics::{MetricsRecorder, NoopMetricsRecorder},
    store::AssignmentStore,
    Evaluator,
};

/// Configuration for [`Evaluator`].
///
/// # Examples
/// ```
/// # use std::time::Duration;
/// # use toggled::{EvaluatorConfig, StoreError, StoredAssignment};
/// fn fetch(_flag: &str, _env: &str) -> Result<Option<StoredAssignment>, StoreError> {
///     Ok(None)
/// }
///
/// let evaluator = EvaluatorConfig::from_store(fetch)
///     .local_ttl(Duration::from_secs(10))
///     .to_evaluator();
/// ```
pub struct EvaluatorConfig {
    pub(crate) store: Box<dyn AssignmentStore + Send + Sync>,
    pub(crate) local_ttl: Duration,
    pub(crate) shared_tier: Option<Box<dyn CacheTier>>,
    pub(crate) shared_ttl: Duration,
    pub(crate) extra_tiers: Vec<(Box<dyn CacheTier>, Duration)>,
    pub(crate) metrics: Box<dyn MetricsRecorder + Send + Sync>,
    pub(crate) bucketer: Box<dyn Bucketer + Send + Sync>,
}

impl EvaluatorConfig {
    /// Default sliding expiration of the process-local tier.
    pub const DEFAULT_LOCAL_TTL: Duration = Duration::from_secs(30);

    /// Default absolute expiration of the shared tier.
    pub const DEFAULT_SHARED_TTL: Duration = Duration::from_secs(60);

    /// Create a default configuration reading assignments from `store`.
    ///
    /// Only the process-local tier is enabled by default.
    pub fn from_store(store: impl AssignmentStore + Send + Sync + 'static) -> Self {
        EvaluatorConfig {
            store: Box::new(store),
            local_ttl: Self::DEFAULT_LOCAL_TTL,
            shared_tier: None,
            shared_ttl: Self::DEFAULT_SHARED_TTL,
            extra_tiers: Vec::new(),
            metrics: Box::new(NoopMetricsRecorder),
            bucketer: Box::new(Sha256Bucketer),
        }
    }

    /// Override the sliding expiration of the process-local tier.
    pub fn local_ttl(mut self, ttl: Duration) -> Self {
        self.local_ttl = ttl;
        self
    }

    /// Add a shared tier, consulted after the process-local one.
    ///
    /// ```
    /// # use toggled::{AssignmentStore, EvaluatorConfig, SharedStore, SharedTier};
    /// # fn example(
    /// #     assignments: impl AssignmentStore + Send + Sync + 'static,
    /// #     store: impl SharedStore + 'static,
    /// # ) {
    /// let config = EvaluatorConfig::from_store(assignments).shared_tier(SharedTier::new(store));
    /// # }
    /// ```
    pub fn shared_tier(mut self, tier: impl CacheTier + 'static) -> Self {
        self.shared_tier = Some(Box::new(tier));
        self
    }

    /// Override the absolute expiration of the shared tier.
    pub fn shared_ttl(mut self, ttl: Duration) -> Self {
        self.shared_ttl = ttl;
        self
    }

    /// Append another tier after the built-in ones.
    pub fn tier(mut self, tier: impl CacheTier + 'static, ttl: Duration) -> Self {
        self.extra_tiers.push((Box::new(tier), ttl));
        self
    }

    /// Set the recorder receiving evaluation and cache metrics.
    pub fn metrics(mut self, metrics: impl MetricsRecorder + Send + Sync + 'static) -> Self {
        self.metrics = Box::new(metrics);
        self
    }

    /// Override how users are bucketed for percentage rollouts.
    pub fn bucketer(mut self, bucketer: impl Bucketer + Send + Sync + 'static) -> Self {
        self.bucketer = Box::new(bucketer);
        self
    }

    /// Create a new [`Evaluator`] using the specified configuration.
    pub fn to_evaluator(self) -> Evaluator {
        Evaluator::new(self)
    }
}

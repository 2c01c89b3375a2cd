use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

/// Observability event emitted by the evaluator. Recording never affects evaluation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent<'a> {
    /// A flag evaluation produced a result.
    Evaluation,
    /// `tier` held the requested assignment.
    CacheHit { tier: &'a str },
    /// `tier` did not hold the requested assignment, or failed to answer.
    CacheMiss { tier: &'a str },
    /// The authoritative store was queried.
    StoreFetch,
}

/// Receives evaluator metrics. Inject one through
/// [`EvaluatorConfig::metrics`](crate::EvaluatorConfig::metrics).
pub trait MetricsRecorder {
    fn record(&self, event: MetricEvent<'_>);
}

pub(crate) struct NoopMetricsRecorder;
impl MetricsRecorder for NoopMetricsRecorder {
    fn record(&self, _event: MetricEvent<'_>) {}
}

impl<T: Fn(MetricEvent<'_>)> MetricsRecorder for T {
    fn record(&self, event: MetricEvent<'_>) {
        self(event);
    }
}

/// In-process counters, one per metric.
///
/// Clones share the same counters, so one clone can be handed to the evaluator and another kept
/// for reading.
#[derive(Clone, Default)]
pub struct Counters {
    inner: Arc<CountersInner>,
}

#[derive(Default)]
struct CountersInner {
    evaluations: AtomicU64,
    store_fetches: AtomicU64,
    tiers: RwLock<HashMap<String, TierCounters>>,
}

#[derive(Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub evaluations: u64,
    pub store_fetches: u64,
    /// Per tier name: `(hits, misses)`.
    pub tiers: HashMap<String, (u64, u64)>,
}

impl Counters {
    pub fn new() -> Self {
        Counters::default()
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let inner = &self.inner;
        let tiers = match inner.tiers.read() {
            Ok(tiers) => tiers
                .iter()
                .map(|(name, counters)| {
                    (
                        name.clone(),
                        (
                            counters.hits.load(Ordering::Relaxed),
                            counters.misses.load(Ordering::Relaxed),
                        ),
                    )
                })
                .collect(),
            Err(_) => HashMap::new(),
        };

        CountersSnapshot {
            evaluations: inner.evaluations.load(Ordering::Relaxed),
            store_fetches: inner.store_fetches.load(Ordering::Relaxed),
            tiers,
        }
    }

    fn with_tier(&self, tier: &str, f: impl Fn(&TierCounters)) {
        // Fast path: tier already registered.
        if let Ok(tiers) = self.inner.tiers.read() {
            if let Some(counters) = tiers.get(tier) {
                f(counters);
                return;
            }
        }

        // A poisoned lock only loses metrics, never evaluations.
        if let Ok(mut tiers) = self.inner.tiers.write() {
            f(&*tiers.entry(tier.to_owned()).or_default());
        }
    }
}

impl MetricsRecorder for Counters {
    fn record(&self, event: MetricEvent<'_>) {
        match event {
            MetricEvent::Evaluation => {
                self.inner.evaluations.fetch_add(1, Ordering::Relaxed);
            }
            MetricEvent::StoreFetch => {
                self.inner.store_fetches.fetch_add(1, Ordering::Relaxed);
            }
            MetricEvent::CacheHit { tier } => self.with_tier(tier, |counters| {
                counters.hits.fetch_add(1, Ordering::Relaxed);
            }),
            MetricEvent::CacheMiss { tier } => self.with_tier(tier, |counters| {
                counters.misses.fetch_add(1, Ordering::Relaxed);
            }),
        }
    }
}

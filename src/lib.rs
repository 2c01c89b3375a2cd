//! Feature flag evaluation with tiered caching.
//!
//! # Overview
//!
//! The crate revolves around an [`Evaluator`] that decides whether a flag is enabled for a user in
//! a given environment. Each flag has one assignment per environment, read from an
//! [`AssignmentStore`], consisting of:
//! - a master switch. An enabled assignment is on for everybody;
//! - an optional [`RuleSet`] over user attributes;
//! - an optional percentage rollout. Users are placed into one of 100 stable buckets by
//!   [`bucket`].
//!
//! The result of an evaluation is an [`EvaluationResult`] carrying the [`Reason`] of the decision
//! and, when rules matched, the matched rules.
//!
//! Assignments are cached in an ordered list of tiers: a process-local [`LocalTier`] with sliding
//! expiration and, optionally, a [`SharedTier`] visible to every process (e.g. Redis with the
//! `redis` feature). A failing tier behaves as a miss. Call [`Evaluator::invalidate_cache`] after
//! every write to an assignment.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Cache failures are never returned from evaluation. [`Error::StoreUnavailable`] is returned when
//! an assignment is not cached and the store cannot be reached: it is up to the caller to decide
//! whether to fail open or closed.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with the `toggled` target.
//! Consider integrating a `log`-compatible logger implementation for visibility into cache and
//! store failures.
//!
//! # Metrics
//!
//! Pass a [`MetricsRecorder`] (or a closure) to [`EvaluatorConfig::metrics`], or use the
//! in-process [`Counters`].

#![warn(rustdoc::missing_crate_level_docs)]

mod assignment;
mod bucketer;
pub mod cache;
mod config;
mod context;
mod error;
mod eval;
mod evaluator;
mod gate;
mod metrics;
mod rules;
mod store;

pub use assignment::{AssignmentSnapshot, StoredAssignment};
pub use bucketer::{bucket, Bucketer, Sha256Bucketer, TOTAL_BUCKETS};
pub use cache::{
    local::LocalTier,
    shared::{SharedStore, SharedTier},
    CacheKey, CacheTier, TieredCache,
};
#[cfg(feature = "redis")]
pub use cache::redis::RedisStore;
pub use config::EvaluatorConfig;
pub use context::{EvaluationContext, USER_ID_ATTRIBUTE};
pub use error::{CacheError, Error, Result, StoreError};
pub use eval::{EvaluationResult, Reason};
pub use evaluator::Evaluator;
pub use gate::FeatureGate;
pub use metrics::{Counters, CountersSnapshot, MetricEvent, MetricsRecorder};
pub use rules::{match_rules, MatchMode, Operator, Rule, RuleSet};
pub use store::{AssignmentStore, HttpAssignmentStore};

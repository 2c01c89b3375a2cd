use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`Evaluator`](crate::Evaluator).
///
/// Everything that can go wrong below the evaluator (cache tiers, rule parsing, operator
/// evaluation) is absorbed with a safe default. Only the failures listed here reach the caller.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A required argument was blank.
    #[error("invalid argument: {0} is required")]
    InvalidArgument(&'static str),

    /// The authoritative store could not be reached and no cache tier held the assignment.
    ///
    /// This is never the same as a "disabled" decision.
    #[error("assignment store unavailable")]
    StoreUnavailable(#[source] StoreError),

    /// A cache tier failed to purge the key. Remaining tiers were still purged.
    #[error("failed to invalidate cache tier {tier}")]
    InvalidationFailed {
        tier: String,
        #[source]
        source: CacheError,
    },

    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

/// Tier-local cache failure. Always treated as a miss for that tier.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("cache tier unavailable: {0}")]
    Unavailable(String),
    #[error("cache tier timed out")]
    Timeout,
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    #[error("failed to serialize cached assignment")]
    Serialization(#[source] Arc<serde_json::Error>),
    #[error("failed to deserialize cached assignment")]
    Deserialization(#[source] Arc<serde_json::Error>),
}

/// Failure fetching from the authoritative assignment store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
    #[error("unexpected response status: {0}")]
    UnexpectedStatus(u16),
    #[error("invalid response from assignment store")]
    InvalidResponse(#[source] Arc<serde_json::Error>),
    #[error("assignment store unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(value: reqwest::Error) -> Self {
        StoreError::Network(Arc::new(value.without_url()))
    }
}

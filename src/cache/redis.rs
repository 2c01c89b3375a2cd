//! [`SharedStore`] backed by Redis.
use std::{sync::Mutex, time::Duration};

use redis::{Client, Commands, Connection, RedisError};

use crate::error::CacheError;

use super::shared::SharedStore;

/// Redis connection reuse is capped so that idle connections don't pile up after a burst.
const MAX_IDLE_CONNECTIONS: usize = 16;

/// Redis-backed shared store.
///
/// Connections are opened lazily and reused. Every command runs with the tier's timeout applied
/// to connecting, reading and writing.
pub struct RedisStore {
    client: Client,
    idle: Mutex<Vec<Connection>>,
}

impl RedisStore {
    /// Create a store for a `redis://` URL. No connection is made until the first call.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(into_cache_error)?;
        Ok(RedisStore {
            client,
            idle: Mutex::new(Vec::new()),
        })
    }

    fn with_connection<T>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
    ) -> Result<T, CacheError> {
        let idle = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let mut connection = match idle {
            Some(connection) => connection,
            None => self
                .client
                .get_connection_with_timeout(timeout)
                .map_err(into_cache_error)?,
        };
        connection
            .set_read_timeout(Some(timeout))
            .map_err(into_cache_error)?;
        connection
            .set_write_timeout(Some(timeout))
            .map_err(into_cache_error)?;

        // A failed connection is dropped rather than returned to the pool.
        let value = f(&mut connection).map_err(into_cache_error)?;

        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < MAX_IDLE_CONNECTIONS {
                idle.push(connection);
            }
        }
        Ok(value)
    }
}

impl SharedStore for RedisStore {
    fn get(&self, key: &str, timeout: Duration) -> Result<Option<String>, CacheError> {
        self.with_connection(timeout, |connection| connection.get(key))
    }

    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<(), CacheError> {
        let seconds = expiry_seconds(ttl);
        self.with_connection(timeout, |connection| connection.set_ex(key, value, seconds))
    }

    fn remove(&self, key: &str, timeout: Duration) -> Result<(), CacheError> {
        self.with_connection(timeout, |connection| connection.del(key))
    }
}

/// `EX` argument for `ttl`. Sub-second remainders round up, and the result is never 0, which Redis
/// rejects.
fn expiry_seconds(ttl: Duration) -> u64 {
    let seconds = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        seconds.saturating_add(1)
    } else {
        seconds.max(1)
    }
}

fn into_cache_error(err: RedisError) -> CacheError {
    if err.is_timeout() {
        CacheError::Timeout
    } else {
        CacheError::Unavailable(err.to_string())
    }
}

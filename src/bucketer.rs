//! Percentage rollout bucketing.
use sha2::{Digest, Sha256};

/// Number of buckets a user can fall into. Percentages are compared against the bucket directly.
pub const TOTAL_BUCKETS: u16 = 100;

/// Maps a `(flag_key, user_id)` pair to a stable bucket in `[0, 100)`.
pub trait Bucketer {
    fn bucket(&self, flag_key: &str, user_id: &str) -> u8;
}

/// The default bucketer. Stable across processes and restarts.
pub struct Sha256Bucketer;

impl Bucketer for Sha256Bucketer {
    fn bucket(&self, flag_key: &str, user_id: &str) -> u8 {
        bucket(flag_key, user_id)
    }
}

/// Compute the rollout bucket for `user_id` under `flag_key`.
///
/// The first two bytes of `sha256(flag_key + "::" + user_id)` are read as a big-endian `u16` and
/// reduced modulo 100.
pub fn bucket(flag_key: &str, user_id: &str) -> u8 {
    let mut hasher = Sha256::new();
    hasher.update(flag_key.as_bytes());
    hasher.update(b"::");
    hasher.update(user_id.as_bytes());
    let hash = hasher.finalize();

    let value = u16::from_be_bytes([hash[0], hash[1]]);
    (value % TOTAL_BUCKETS) as u8
}

#[cfg(test)]
pub struct DeterministicBucketer(pub std::collections::HashMap<String, u8>);

#[cfg(test)]
impl Bucketer for DeterministicBucketer {
    fn bucket(&self, _flag_key: &str, user_id: &str) -> u8 {
        self.0.get(user_id).copied().unwrap_or(0) % TOTAL_BUCKETS as u8
    }
}

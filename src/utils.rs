//! Shared utilities for the cache library.

use std::fmt::Display;
use std::time::{SystemTime, UNIX_EPOCH};

/// Build a composite store key from a prefix and a key.
///
/// Format: `{prefix}:{key}`
pub fn build_cache_key<P: Display>(prefix: &P, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

/// Convert a TTL in seconds to milliseconds, saturating on overflow.
pub fn ttl_ms(ttl_secs: u64) -> i64 {
    i64::try_from(ttl_secs)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000)
}

/// Simple pseudo-random number generator (0.0 to 1.0).
/// This avoids adding a dependency on rand crate.
pub fn rand_simple() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default(),
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}

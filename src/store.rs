use async_trait::async_trait;

use crate::error::CacheError;

/// How a store can maintain rate limit counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMode {
    /// `increment` and `expire` are atomic on the backend.
    Atomic,
    /// Only plain `get`/`set` are available. Counters are maintained with a read followed by a
    /// write, which loses updates when several writers hit the same window concurrently.
    ReadModifyWrite,
}

/// A store is a shared key-value interface with per-key expiry.
///
/// Values are opaque serialized strings. The store is responsible for making keys disappear
/// once their TTL elapses; callers never delete expired data themselves.
#[async_trait]
pub trait Store: Send + Sync {
    /// A name for metrics/tracing.
    ///
    /// # Example
    /// - "hashmap"
    /// - "moka"
    /// - "redis"
    fn name(&self) -> &'static str;

    /// Returns how rate limit counters can be kept in this store.
    ///
    /// Default implementation returns `ReadModifyWrite` for safety.
    fn counter_mode(&self) -> CounterMode {
        CounterMode::ReadModifyWrite
    }

    /// Return the stored value.
    ///
    /// The response must be `None` for missing or expired keys.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Sets the value for the given key, expiring it after `ttl_secs` seconds.
    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError>;

    /// Removes the key(s) from the store.
    async fn remove(&self, keys: &[&str]) -> Result<(), CacheError>;

    /// Atomically increment an integer counter, creating it at 1 when absent.
    ///
    /// Only stores reporting `CounterMode::Atomic` need to implement this.
    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        Err(CacheError::operation(
            self.name(),
            key,
            "atomic increment not supported",
        ))
    }

    /// Set the expiry of an existing key.
    ///
    /// Only stores reporting `CounterMode::Atomic` need to implement this.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let _ = ttl_secs;
        Err(CacheError::operation(
            self.name(),
            key,
            "expire not supported",
        ))
    }
}

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::ttl_ms;

/// Configuration for MokaStore.
#[derive(Debug, Clone)]
pub struct MokaStoreConfig {
    /// Maximum number of entries the cache can hold.
    pub max_capacity: u64,

    /// Time to idle: entries are expired if not accessed within this duration.
    /// `None` means entries don't expire based on idle time.
    pub time_to_idle: Option<Duration>,

    /// Time source used to check per-key expiry on read.
    pub clock: Arc<dyn Clock>,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        MokaStoreConfig {
            max_capacity: 10_000,
            time_to_idle: None,
            clock: Arc::new(SystemClock),
        }
    }
}

#[derive(Clone)]
struct Slot {
    data: String,
    ttl: Duration,
    /// Unix milli timestamp, checked against the configured clock.
    expires: i64,
}

/// Per-entry expiry: every write resets the entry's lifetime to its own TTL.
struct SlotExpiry;

impl Expiry<String, Slot> for SlotExpiry {
    fn expire_after_create(&self, _key: &String, value: &Slot, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Slot,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// High-performance concurrent store using Moka.
///
/// MokaStore provides:
/// - Lock-free concurrent access for reads and writes
/// - Per-key TTLs with automatic background eviction
/// - Bounded memory via `max_capacity`
///
/// Moka offers no atomic read-increment-write primitive through this interface, so rate limit
/// counters kept here use `CounterMode::ReadModifyWrite`.
pub struct MokaStore {
    cache: Cache<String, Slot>,
    clock: Arc<dyn Clock>,
}

impl MokaStore {
    /// Create a new MokaStore with the given configuration.
    ///
    /// # Example
    /// ```ignore
    /// let store = MokaStore::new(MokaStoreConfig {
    ///     max_capacity: 10_000,
    ///     ..Default::default()
    /// });
    /// ```
    pub fn new(config: MokaStoreConfig) -> Self {
        let mut builder = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(SlotExpiry);

        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        MokaStore {
            cache: builder.build(),
            clock: config.clock,
        }
    }

    /// Get cache statistics (for monitoring/debugging).
    pub fn stats(&self) -> (u64, u64) {
        let entry_count = self.cache.entry_count();
        let weighted_size = self.cache.weighted_size();
        (entry_count, weighted_size)
    }
}

#[async_trait]
impl Store for MokaStore {
    fn name(&self) -> &'static str {
        "moka"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.cache.get(key).await {
            Some(slot) => {
                if self.clock.now_ms() >= slot.expires {
                    self.cache.invalidate(key).await;
                    return Ok(None);
                }

                Ok(Some(slot.data))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let slot = Slot {
            data: value,
            ttl: Duration::from_secs(ttl_secs),
            expires: self.clock.now_ms().saturating_add(ttl_ms(ttl_secs)),
        };

        self.cache.insert(key.to_string(), slot).await;

        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), CacheError> {
        for key in keys {
            self.cache.invalidate(*key).await;
        }

        Ok(())
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::store::{CounterMode, Store};
use crate::utils::{rand_simple, ttl_ms};

/// Configuration for eviction on set operations.
#[derive(Debug, Clone)]
pub struct EvictOnSetConfig {
    /// Provide a number between 0 and 1 to calculate whether eviction should run on each set.
    ///
    /// - `1.0` -> run eviction on every `set`
    /// - `0.5` -> run eviction on every 2nd `set` (on average)
    /// - `0.0` -> disable eviction
    pub frequency: f64,

    /// Remove items until the number of items in the map is lower than `max_items`.
    pub max_items: usize,
}

/// Configuration for HashMapStore.
#[derive(Debug, Clone)]
pub struct HashMapStoreConfig {
    /// Remove expired entries on every `set` operation.
    pub evict_on_set: Option<EvictOnSetConfig>,

    /// Time source used for expiry.
    pub clock: Arc<dyn Clock>,
}

impl Default for HashMapStoreConfig {
    fn default() -> Self {
        HashMapStoreConfig {
            evict_on_set: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl HashMapStoreConfig {
    /// Default configuration driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        HashMapStoreConfig {
            clock,
            ..Default::default()
        }
    }
}

/// Internal stored value with expiration time.
#[derive(Clone)]
struct Slot {
    data: String,
    /// Unix milli timestamp. `i64::MAX` means the key has no expiry yet.
    expires: i64,
}

/// Thread-safe in-memory store using HashMap with RwLock.
///
/// Counters are incremented under the write lock, so this store reports
/// `CounterMode::Atomic` within a single process.
///
/// Suitable for:
/// - Tests and single-process deployments
/// - Falling back when Redis is unavailable
///
/// For high-concurrency scenarios, consider using `MokaStore` instead.
pub struct HashMapStore {
    state: RwLock<HashMap<String, Slot>>,
    evict_on_set: Option<EvictOnSetConfig>,
    clock: Arc<dyn Clock>,
}

impl HashMapStore {
    /// Create a new HashMapStore with the given configuration.
    pub fn new(config: HashMapStoreConfig) -> Self {
        HashMapStore {
            state: RwLock::new(HashMap::new()),
            evict_on_set: config.evict_on_set,
            clock: config.clock,
        }
    }

    /// Number of keys currently held, including ones that expired but were not read since.
    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }

    /// Run eviction if configured and random check passes.
    async fn maybe_evict(&self) {
        let Some(ref config) = self.evict_on_set else {
            return;
        };

        // Check frequency
        if config.frequency <= 0.0 {
            return;
        }

        let should_evict = if config.frequency >= 1.0 {
            true
        } else {
            rand_simple() < config.frequency
        };

        if !should_evict {
            return;
        }

        let mut state = self.state.write().await;
        let now = self.clock.now_ms();

        // First delete all expired entries
        state.retain(|_, v| v.expires > now);

        // If still over max_items, remove the entries closest to expiry
        if state.len() > config.max_items {
            let mut entries: Vec<_> = state.iter().map(|(k, v)| (k.clone(), v.expires)).collect();
            entries.sort_by_key(|(_, expires)| *expires);

            let to_remove = state.len() - config.max_items;
            for (key, _) in entries.into_iter().take(to_remove) {
                state.remove(&key);
            }
        }
    }
}

#[async_trait]
impl Store for HashMapStore {
    fn name(&self) -> &'static str {
        "hashmap"
    }

    fn counter_mode(&self) -> CounterMode {
        CounterMode::Atomic
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let state = self.state.read().await;

        let Some(slot) = state.get(key) else {
            return Ok(None);
        };

        let now = self.clock.now_ms();
        if slot.expires <= now {
            // Entry is expired, remove it
            drop(state);
            let mut state = self.state.write().await;
            if state.get(key).is_some_and(|s| s.expires <= now) {
                state.remove(key);
            }
            return Ok(None);
        }

        Ok(Some(slot.data.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let expires = self.clock.now_ms().saturating_add(ttl_ms(ttl_secs));

        {
            let mut state = self.state.write().await;
            state.insert(
                key.to_string(),
                Slot {
                    data: value,
                    expires,
                },
            );
        }

        self.maybe_evict().await;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), CacheError> {
        let mut state = self.state.write().await;

        for key in keys {
            state.remove(*key);
        }

        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        let now = self.clock.now_ms();
        let mut state = self.state.write().await;

        let current = match state.get(key) {
            Some(slot) if slot.expires > now => Some(slot),
            _ => None,
        };

        let (count, expires) = match current {
            Some(slot) => {
                let count: i64 = slot.data.parse().map_err(|_| {
                    CacheError::operation("hashmap", key, "value is not an integer")
                })?;
                (count + 1, slot.expires)
            }
            None => (1, i64::MAX),
        };

        state.insert(
            key.to_string(),
            Slot {
                data: count.to_string(),
                expires,
            },
        );

        Ok(count)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let now = self.clock.now_ms();
        let mut state = self.state.write().await;

        if let Some(slot) = state.get_mut(key)
            && slot.expires > now
        {
            slot.expires = now.saturating_add(ttl_ms(ttl_secs));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn store_with_clock() -> (HashMapStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = HashMapStore::new(HashMapStoreConfig::with_clock(clock.clone()));
        (store, clock)
    }

    #[tokio::test]
    async fn test_get_set_remove() {
        let store = HashMapStore::new(HashMapStoreConfig::default());

        // Initially empty
        let result = store.get("key1").await.unwrap();
        assert!(result.is_none());

        // Set a value
        store.set("key1", "value1".to_string(), 300).await.unwrap();

        // Get the value
        let result = store.get("key1").await.unwrap();
        assert_eq!(result.as_deref(), Some("value1"));

        // Remove the value
        store.remove(&["key1"]).await.unwrap();

        // Should be gone
        let result = store.get("key1").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_value_expires_after_ttl() {
        let (store, clock) = store_with_clock();
        store.set("k", "v".to_string(), 180).await.unwrap();

        clock.advance(Duration::from_secs(179));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(Duration::from_secs(1));
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_increment_and_expire() {
        let (store, clock) = store_with_clock();

        assert_eq!(store.increment("bucket:0").await.unwrap(), 1);
        store.expire("bucket:0", 60).await.unwrap();
        assert_eq!(store.increment("bucket:0").await.unwrap(), 2);
        assert_eq!(store.increment("bucket:0").await.unwrap(), 3);

        clock.advance(Duration::from_secs(60));
        assert!(store.get("bucket:0").await.unwrap().is_none());
        assert_eq!(store.increment("bucket:0").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_non_integer_fails() {
        let store = HashMapStore::new(HashMapStoreConfig::default());
        store.set("k", "abc".to_string(), 60).await.unwrap();

        let err = store.increment("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Operation { .. }));
    }

    #[tokio::test]
    async fn test_evict_on_set_caps_size() {
        let store = HashMapStore::new(HashMapStoreConfig {
            evict_on_set: Some(EvictOnSetConfig {
                frequency: 1.0,
                max_items: 2,
            }),
            ..Default::default()
        });

        store.set("short", "1".to_string(), 10).await.unwrap();
        store.set("long", "2".to_string(), 1000).await.unwrap();
        store.set("mid", "3".to_string(), 100).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.get("short").await.unwrap().is_none());
        assert!(store.get("long").await.unwrap().is_some());
    }
}

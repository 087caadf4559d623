use serde::{Serialize, de::DeserializeOwned};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::entry::{CacheEntry, FRESH_FLAG, Freshness, fresh_key, value_key};
use crate::error::CacheError;
use crate::inflight::InFlight;
use crate::store::{CounterMode, Store};
use crate::utils::build_cache_key;

/// Type-erased result of a deduplicated computation.
///
/// One registry serves every value type; callers downcast back to their own type.
type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Deduplication tag for background refreshes of stale entries.
const REFRESH_TAG: &str = "refresh";

/// Deduplication tag for synchronous loads on a miss.
const MISS_TAG: &str = "miss";

/// Prefix of the store key counting consecutive refresh failures (TTL = stale window).
const FAILURES_PREFIX: &str = "fails";

/// Options for the coordinator.
#[derive(Debug, Clone)]
pub struct SwrConfig {
    /// Consecutive background refresh failures after which a stale entry is evicted, so the
    /// next read turns into a synchronous miss instead of serving stale data again.
    ///
    /// The count lives in the store next to the value and expires with the stale window.
    /// Rate limit rejections and timeouts are not counted. `0` (the default) disables
    /// eviction; staleness is then bounded only by the stale window.
    pub max_refresh_failures: u32,
}

impl Default for SwrConfig {
    fn default() -> Self {
        SwrConfig {
            max_refresh_failures: 0,
        }
    }
}

/// Store key of the refresh failure counter for a logical cache key.
fn failures_key(key: &str) -> String {
    build_cache_key(&FAILURES_PREFIX, key)
}

/// Result of reading both store keys of a logical entry.
enum Lookup<V> {
    Fresh(CacheEntry<V>),
    Stale(CacheEntry<V>),
    Miss,
}

/// State shared with computations running on their own tasks.
#[derive(Clone)]
struct Writer {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    max_refresh_failures: u32,
}

impl Writer {
    /// Write the value (TTL = stale window) and then the freshness flag (TTL = freshness window).
    ///
    /// The two writes are not atomic. A reader in between sees the entry as stale.
    async fn persist<V: Serialize>(
        &self,
        key: &str,
        value: &V,
        freshness_sec: u64,
        stale_sec: u64,
    ) -> Result<(), CacheError> {
        let data = CacheEntry::new(value, self.clock.now_secs()).encode()?;
        self.store.set(&value_key(key), data, stale_sec).await?;

        if freshness_sec > 0 {
            self.store
                .set(&fresh_key(key), FRESH_FLAG.to_string(), freshness_sec)
                .await?;
        }

        Ok(())
    }

    /// Persist a computed value, logging rather than failing when the store rejects it.
    async fn persist_computed<V: Serialize>(
        &self,
        key: &str,
        value: &V,
        freshness_sec: u64,
        stale_sec: u64,
    ) {
        match self.persist(key, value, freshness_sec, stale_sec).await {
            Ok(()) => {
                if self.max_refresh_failures > 0 {
                    self.remove_keys(key, &[failures_key(key)]).await;
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to store computed value: tier={}, key={}, error={}",
                    self.store.name(),
                    key,
                    e
                );
            }
        }
    }

    /// Read the value of `key` if it is present and fresh.
    async fn fresh_value<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let value_key = value_key(key);
        let fresh_key = fresh_key(key);
        let (value, flag) = tokio::join!(self.store.get(&value_key), self.store.get(&fresh_key));

        match (value, flag) {
            (Ok(Some(data)), Ok(Some(_))) => CacheEntry::<V>::decode(key, &data)
                .ok()
                .map(|entry| entry.value),
            _ => None,
        }
    }

    async fn remove_entry(&self, key: &str) {
        self.remove_keys(key, &[value_key(key), fresh_key(key), failures_key(key)])
            .await;
    }

    async fn remove_keys(&self, key: &str, store_keys: &[String]) {
        let store_keys: Vec<&str> = store_keys.iter().map(String::as_str).collect();
        if let Err(e) = self.store.remove(&store_keys).await {
            tracing::warn!(
                "Failed to remove entry: tier={}, key={}, error={}",
                self.store.name(),
                key,
                e
            );
        }
    }

    async fn record_refresh_failure(&self, key: &str, stale_sec: u64, error: &CacheError) {
        if self.max_refresh_failures == 0
            || error.is_rate_limited()
            || matches!(error, CacheError::Timeout { .. })
        {
            tracing::warn!(
                "Background refresh failed, stale value kept: key={}, error={}",
                key,
                error
            );
            return;
        }

        let failures = match self.increment_failures(key, stale_sec).await {
            Ok(failures) => failures,
            Err(e) => {
                tracing::warn!(
                    "Failed to count refresh failure: tier={}, key={}, error={}",
                    self.store.name(),
                    key,
                    e
                );
                return;
            }
        };

        tracing::warn!(
            "Background refresh failed, stale value kept: key={}, consecutive_failures={}, error={}",
            key,
            failures,
            error
        );

        if failures >= self.max_refresh_failures {
            tracing::warn!(
                "Evicting stale entry after {} consecutive refresh failures: key={}",
                failures,
                key
            );
            self.remove_entry(key).await;
        }
    }

    /// Count one more refresh failure. The counter expires with the stale window.
    async fn increment_failures(&self, key: &str, stale_sec: u64) -> Result<u32, CacheError> {
        let failures_key = failures_key(key);

        let count = match self.store.counter_mode() {
            CounterMode::Atomic => {
                let count = self.store.increment(&failures_key).await?;
                if count == 1 {
                    self.store.expire(&failures_key, stale_sec).await?;
                }
                count
            }
            CounterMode::ReadModifyWrite => {
                let current = self
                    .store
                    .get(&failures_key)
                    .await?
                    .and_then(|raw| raw.trim().parse::<i64>().ok())
                    .unwrap_or(0);
                let count = current.saturating_add(1);
                self.store
                    .set(&failures_key, count.to_string(), stale_sec)
                    .await?;
                count
            }
        };

        Ok(u32::try_from(count.max(0)).unwrap_or(u32::MAX))
    }
}

/// Stale-while-revalidate coordinator.
///
/// Each logical key is backed by two store keys: the value, which lives for the stale window,
/// and a freshness flag, which lives for the freshness window. Values are serialized as JSON,
/// so any `Serialize + DeserializeOwned` type can be cached through the same coordinator and
/// the same store.
///
/// Computations are deduplicated per process: concurrent misses for one key share a single
/// `compute` call, as do concurrent background refreshes.
pub struct SwrCache {
    writer: Writer,
    inflight: InFlight<ErasedValue>,
}

impl Clone for SwrCache {
    fn clone(&self) -> Self {
        SwrCache {
            writer: self.writer.clone(),
            inflight: self.inflight.clone(),
        }
    }
}

impl SwrCache {
    /// Create a new SWR coordinator on the system clock.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, Arc::new(SystemClock), SwrConfig::default())
    }

    /// Create a new SWR coordinator.
    ///
    /// # Arguments
    /// * `store` - The shared store holding values and freshness flags
    /// * `clock` - Time source for `stored_at` timestamps
    /// * `config` - Refresh failure policy
    pub fn with_config(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: SwrConfig) -> Self {
        SwrCache {
            writer: Writer {
                store,
                clock,
                max_refresh_failures: config.max_refresh_failures,
            },
            inflight: InFlight::new(),
        }
    }

    /// Stale-while-revalidate: get the cached value or compute it.
    ///
    /// - Fresh (value and flag present): return the cached value
    /// - Stale (value present, flag expired): return the cached value and refresh it in the
    ///   background; a failed refresh is logged and leaves the stale value in place
    /// - Miss: compute synchronously, store, and return; a failed computation reaches every
    ///   caller waiting on it and nothing is stored
    ///
    /// # Arguments
    /// * `key` - The logical cache key
    /// * `freshness_sec` - How long a computed value is served without revalidation
    /// * `stale_sec` - How long a computed value may be served at all
    /// * `compute` - Produces a new value, typically by calling the upstream API
    ///
    /// # Example
    /// ```ignore
    /// let summary = cache
    ///     .get_or_revalidate("weather:current:51.507:-0.128:metric", 180, 300, move || async move {
    ///         upstream.current(51.507, -0.128, Units::Metric).await
    ///     })
    ///     .await?;
    /// ```
    pub async fn get_or_revalidate<T, F, Fut>(
        &self,
        key: &str,
        freshness_sec: u64,
        stale_sec: u64,
        compute: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        validate_windows(key, freshness_sec, stale_sec)?;

        match self.lookup::<T>(key).await {
            Lookup::Fresh(entry) => {
                tracing::debug!("Cache fresh: key={}", key);
                Ok(entry.value)
            }
            Lookup::Stale(entry) => {
                tracing::debug!(
                    "Cache stale, revalidating in background: key={}, age_secs={}",
                    key,
                    entry.age_secs(self.writer.clock.now_secs())
                );
                self.spawn_refresh(key, freshness_sec, stale_sec, compute);
                Ok(entry.value)
            }
            Lookup::Miss => {
                tracing::debug!("Cache miss: key={}", key);
                self.load(key, freshness_sec, stale_sec, compute).await
            }
        }
    }

    /// Return the cached value, fresh or stale, without computing anything.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.lookup::<T>(key).await {
            Lookup::Fresh(entry) | Lookup::Stale(entry) => Ok(Some(entry.value)),
            Lookup::Miss => Ok(None),
        }
    }

    /// Store a value directly, as if it had just been computed.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        freshness_sec: u64,
        stale_sec: u64,
    ) -> Result<(), CacheError> {
        validate_windows(key, freshness_sec, stale_sec)?;
        self.writer
            .persist(key, value, freshness_sec, stale_sec)
            .await
    }

    /// Remove the value, the freshness flag and any refresh failure count of a key.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let value_key = value_key(key);
        let fresh_key = fresh_key(key);
        let failures_key = failures_key(key);
        self.writer
            .store
            .remove(&[&value_key, &fresh_key, &failures_key])
            .await
    }

    /// Observe the state of a key without decoding its value.
    pub async fn freshness(&self, key: &str) -> Result<Freshness, CacheError> {
        let value_key = value_key(key);
        let fresh_key = fresh_key(key);
        let (value, flag) = tokio::join!(
            self.writer.store.get(&value_key),
            self.writer.store.get(&fresh_key)
        );

        Ok(match (value?, flag?) {
            (None, _) => Freshness::Miss,
            (Some(_), Some(_)) => Freshness::Fresh,
            (Some(_), None) => Freshness::Stale,
        })
    }

    /// Number of computations (refreshes and misses) currently in flight in this process.
    pub fn pending_computations(&self) -> usize {
        self.inflight.len()
    }

    /// Read both store keys of `key` and classify the entry.
    ///
    /// Store failures and undecodable values degrade to a miss.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        let store = &self.writer.store;
        let value_key = value_key(key);
        let fresh_key = fresh_key(key);

        let (value, flag) = tokio::join!(store.get(&value_key), store.get(&fresh_key));

        let data = match value {
            Ok(Some(data)) => data,
            Ok(None) => return Lookup::Miss,
            Err(e) => {
                tracing::warn!(
                    "Cache read failed, treating as miss: tier={}, key={}, error={}",
                    store.name(),
                    key,
                    e
                );
                return Lookup::Miss;
            }
        };

        let entry = match CacheEntry::<T>::decode(key, &data) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Discarding cached entry: {}", e);
                self.writer.remove_entry(key).await;
                return Lookup::Miss;
            }
        };

        match flag {
            Ok(Some(_)) => Lookup::Fresh(entry),
            Ok(None) => Lookup::Stale(entry),
            Err(e) => {
                tracing::warn!(
                    "Freshness read failed, treating as stale: tier={}, key={}, error={}",
                    store.name(),
                    key,
                    e
                );
                Lookup::Stale(entry)
            }
        }
    }

    /// Compute on a miss, sharing the computation with concurrent callers.
    ///
    /// The value is re-read first: a load that finished between our lookup and joining the
    /// registry has already stored it.
    async fn load<T, F, Fut>(
        &self,
        key: &str,
        freshness_sec: u64,
        stale_sec: u64,
        compute: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        let writer = self.writer.clone();
        let owned_key = key.to_string();

        let erased = self
            .inflight
            .run(&build_cache_key(&MISS_TAG, key), move || async move {
                if let Some(value) = writer.fresh_value::<T>(&owned_key).await {
                    tracing::debug!("Cache filled by an earlier load: key={}", owned_key);
                    return Ok(Arc::new(value) as ErasedValue);
                }

                let value = compute().await?;
                writer
                    .persist_computed(&owned_key, &value, freshness_sec, stale_sec)
                    .await;
                Ok(Arc::new(value) as ErasedValue)
            })
            .await?;

        downcast(key, erased)
    }

    /// Start a background refresh unless one is already running for `key`.
    fn spawn_refresh<T, F, Fut>(&self, key: &str, freshness_sec: u64, stale_sec: u64, compute: F)
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        let writer = self.writer.clone();
        let owned_key = key.to_string();

        // Nobody awaits the result; the refresh runs to completion on its own task.
        let _ = self
            .inflight
            .join(&build_cache_key(&REFRESH_TAG, key), move || async move {
                match compute().await {
                    Ok(value) => {
                        writer
                            .persist_computed(&owned_key, &value, freshness_sec, stale_sec)
                            .await;
                        Ok(Arc::new(value) as ErasedValue)
                    }
                    Err(e) => {
                        writer
                            .record_refresh_failure(&owned_key, stale_sec, &e)
                            .await;
                        Err(e)
                    }
                }
            });
    }
}

fn validate_windows(key: &str, freshness_sec: u64, stale_sec: u64) -> Result<(), CacheError> {
    if stale_sec == 0 || freshness_sec > stale_sec {
        return Err(CacheError::Config(format!(
            "invalid windows for key '{}': freshness {}s must not exceed stale {}s, and stale must be positive",
            key, freshness_sec, stale_sec
        )));
    }
    Ok(())
}

fn downcast<T: Clone + Send + Sync + 'static>(key: &str, erased: ErasedValue) -> Result<T, CacheError> {
    erased
        .downcast::<T>()
        .map(Arc::unwrap_or_clone)
        .map_err(|_| {
            CacheError::Serialization(format!(
                "in-flight value for key '{}' has a different type",
                key
            ))
        })
}

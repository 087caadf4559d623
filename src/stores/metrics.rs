//! Metrics middleware for stores.
//!
//! This module provides a `MetricsStore` wrapper that emits metrics for all
//! store operations (reads, writes, removes, counter increments) to a user-provided sink.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use weather_swr::{MokaStore, MokaStoreConfig, Store};
//! use weather_swr::stores::metrics::{MetricsStore, StoreMetric, MetricsSink};
//!
//! let sink = Arc::new(MyMetricsSink::new());
//! let moka = Arc::new(MokaStore::new(MokaStoreConfig::default()));
//! let store: Arc<dyn Store> = Arc::new(MetricsStore::new(moka, sink.clone()));
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::error::CacheError;
use crate::store::{CounterMode, Store};

/// Metrics emitted by the MetricsStore wrapper.
#[derive(Debug, Clone)]
pub enum StoreMetric {
    /// Emitted on every read (get) operation.
    Read {
        /// The key that was read.
        key: String,
        /// Whether the key was found.
        hit: bool,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the wrapped store (from Store::name()).
        tier: String,
    },
    /// Emitted on every write (set) operation.
    Write {
        key: String,
        ttl_secs: u64,
        latency_ms: f64,
        tier: String,
    },
    /// Emitted on every remove operation.
    Remove {
        /// Number of keys in the remove batch.
        key_count: usize,
        /// First key in the batch (for debugging/identification).
        first_key: Option<String>,
        latency_ms: f64,
        tier: String,
    },
    /// Emitted on every atomic counter increment.
    Increment {
        key: String,
        /// Resulting counter value, `None` when the increment failed.
        count: Option<i64>,
        latency_ms: f64,
        tier: String,
    },
}

/// Trait for receiving store metrics.
///
/// Implement this trait to collect metrics from `MetricsStore`.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Emit a single metric.
    ///
    /// This is called synchronously in the hot path of store operations.
    /// Implementations should be fast (e.g., buffer metrics in memory).
    fn emit(&self, metric: StoreMetric);

    /// Flush any buffered metrics.
    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A store wrapper that emits metrics for all operations.
pub struct MetricsStore {
    inner: Arc<dyn Store>,
    sink: Arc<dyn MetricsSink>,
    tier_name: String,
}

impl MetricsStore {
    /// Create a new MetricsStore wrapping the given store.
    pub fn new(inner: Arc<dyn Store>, sink: Arc<dyn MetricsSink>) -> Self {
        let tier_name = inner.name().to_string();
        MetricsStore {
            inner,
            sink,
            tier_name,
        }
    }

    /// Get a reference to the metrics sink.
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    fn elapsed_ms(start: Instant) -> f64 {
        start.elapsed().as_secs_f64() * 1000.0
    }
}

#[async_trait]
impl Store for MetricsStore {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn counter_mode(&self) -> CounterMode {
        self.inner.counter_mode()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(StoreMetric::Read {
            key: key.to_string(),
            hit: matches!(result, Ok(Some(_))),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.set(key, value, ttl_secs).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(StoreMetric::Write {
            key: key.to_string(),
            ttl_secs,
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.remove(keys).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(StoreMetric::Remove {
            key_count: keys.len(),
            first_key: keys.first().map(|k| k.to_string()),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        let start = Instant::now();
        let result = self.inner.increment(key).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(StoreMetric::Increment {
            key: key.to_string(),
            count: result.as_ref().ok().copied(),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), CacheError> {
        self.inner.expire(key, ttl_secs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::{HashMapStore, HashMapStoreConfig};
    use crate::stores::moka::{MokaStore, MokaStoreConfig};
    use std::sync::Mutex;

    struct TestSink {
        metrics: Mutex<Vec<StoreMetric>>,
    }

    impl TestSink {
        fn new() -> Self {
            TestSink {
                metrics: Mutex::new(Vec::new()),
            }
        }

        fn take_metrics(&self) -> Vec<StoreMetric> {
            std::mem::take(&mut *self.metrics.lock().unwrap())
        }
    }

    #[async_trait]
    impl MetricsSink for TestSink {
        fn emit(&self, metric: StoreMetric) {
            self.metrics.lock().unwrap().push(metric);
        }

        async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }
    }

    fn hashmap() -> Arc<dyn Store> {
        Arc::new(HashMapStore::new(HashMapStoreConfig::default()))
    }

    #[tokio::test]
    async fn test_read_miss() {
        let sink = Arc::new(TestSink::new());
        let store = MetricsStore::new(hashmap(), sink.clone());

        let result = store.get("key1").await.unwrap();
        assert!(result.is_none());

        let metrics = sink.take_metrics();
        assert_eq!(metrics.len(), 1);

        match &metrics[0] {
            StoreMetric::Read {
                key,
                hit,
                tier,
                latency_ms,
            } => {
                assert_eq!(key, "key1");
                assert!(!hit);
                assert_eq!(tier, "hashmap");
                assert!(*latency_ms >= 0.0);
            }
            _ => panic!("Expected Read metric"),
        }
    }

    #[tokio::test]
    async fn test_write_then_read_hit() {
        let sink = Arc::new(TestSink::new());
        let store = MetricsStore::new(hashmap(), sink.clone());

        store.set("key1", "value".to_string(), 300).await.unwrap();
        store.get("key1").await.unwrap();

        let metrics = sink.take_metrics();
        assert_eq!(metrics.len(), 2);

        match &metrics[0] {
            StoreMetric::Write { key, ttl_secs, .. } => {
                assert_eq!(key, "key1");
                assert_eq!(*ttl_secs, 300);
            }
            _ => panic!("Expected Write metric"),
        }
        match &metrics[1] {
            StoreMetric::Read { hit, .. } => assert!(hit),
            _ => panic!("Expected Read metric"),
        }
    }

    #[tokio::test]
    async fn test_remove_metric() {
        let sink = Arc::new(TestSink::new());
        let store = MetricsStore::new(hashmap(), sink.clone());

        store.remove(&["key1", "key2", "key3"]).await.unwrap();

        let metrics = sink.take_metrics();
        assert_eq!(metrics.len(), 1);

        match &metrics[0] {
            StoreMetric::Remove {
                key_count,
                first_key,
                ..
            } => {
                assert_eq!(*key_count, 3);
                assert_eq!(first_key.as_deref(), Some("key1"));
            }
            _ => panic!("Expected Remove metric"),
        }
    }

    #[tokio::test]
    async fn test_increment_metric_records_count() {
        let sink = Arc::new(TestSink::new());
        let store = MetricsStore::new(hashmap(), sink.clone());

        store.increment("c").await.unwrap();
        store.increment("c").await.unwrap();

        let counts: Vec<_> = sink
            .take_metrics()
            .into_iter()
            .map(|m| match m {
                StoreMetric::Increment { count, .. } => count,
                other => panic!("Expected Increment metric, got {other:?}"),
            })
            .collect();
        assert_eq!(counts, vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_counter_mode_delegation() {
        let sink = Arc::new(TestSink::new());

        let atomic = MetricsStore::new(hashmap(), sink.clone());
        assert_eq!(atomic.counter_mode(), CounterMode::Atomic);

        let moka: Arc<dyn Store> = Arc::new(MokaStore::new(MokaStoreConfig::default()));
        let fallback = MetricsStore::new(moka, sink);
        assert_eq!(fallback.counter_mode(), CounterMode::ReadModifyWrite);
    }
}

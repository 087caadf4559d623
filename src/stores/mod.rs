//! Store implementations and store selection.

pub mod memory;
pub mod metrics;
pub mod moka;
pub mod redis;

use std::env;
use std::sync::Arc;

pub use self::memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use self::metrics::{MetricsSink, MetricsStore, StoreMetric};
pub use self::moka::{MokaStore, MokaStoreConfig};
pub use self::redis::{RedisStore, RedisStoreConfig};

use crate::store::Store;

/// Which shared store to use, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Use Redis as the shared store (from USE_REDIS, anything but `false` enables it).
    pub use_redis: bool,

    /// Redis URL (from REDIS_URL, defaults to the local instance).
    pub redis_url: String,

    /// Optional key prefix (from REDIS_KEY_PREFIX).
    pub key_prefix: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            use_redis: true,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: None,
        }
    }
}

impl StoreConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            use_redis: env::var("USE_REDIS")
                .map(|v| !v.trim().eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.use_redis),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: env::var("REDIS_KEY_PREFIX").ok().filter(|p| !p.is_empty()),
        }
    }
}

/// Open the configured shared store.
///
/// Redis is used when enabled and reachable. Otherwise the process falls back to an in-memory
/// store: caching keeps working, but counters and cached values are no longer shared between
/// processes.
pub async fn connect(config: &StoreConfig) -> Arc<dyn Store> {
    if !config.use_redis {
        tracing::warn!("Redis disabled by configuration, using in-memory store");
        return Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
    }

    let redis_config = RedisStoreConfig {
        url: config.redis_url.clone(),
        key_prefix: config.key_prefix.clone(),
    };

    match RedisStore::new(redis_config).await {
        Ok(store) => {
            tracing::info!("Connected to Redis at {}", config.redis_url);
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!(
                "Failed to connect to Redis at {}, falling back to in-memory store: {}",
                config.redis_url,
                e
            );
            Arc::new(HashMapStore::new(HashMapStoreConfig::default()))
        }
    }
}

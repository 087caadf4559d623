//! Builder API for wiring a weather service.
//!
//! The cache and the rate limiter share one store, so cached values and rate counters are
//! consistent across every process pointed at the same Redis.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::{UpstreamLimits, WeatherConfig};
use crate::error::CacheError;
use crate::rate_limit::RateLimiter;
use crate::store::Store;
use crate::stores::{self, HashMapStore, HashMapStoreConfig};
use crate::swr::{SwrCache, SwrConfig};
use crate::upstream::{OpenWeatherClient, WeatherUpstream};
use crate::weather::WeatherService;

/// Builder for `WeatherService`.
///
/// # Example
///
/// ```ignore
/// use weather_swr::{WeatherServiceBuilder, OpenWeatherClient, Units};
/// use std::sync::Arc;
///
/// let service = WeatherServiceBuilder::new()
///     .upstream(Arc::new(OpenWeatherClient::new(&config.openweather)?))
///     .request_timeout(Duration::from_secs(2))
///     .build()?;
///
/// let summary = service.current_summary(51.507, -0.128, Units::Metric, None).await?;
/// ```
pub struct WeatherServiceBuilder {
    store: Option<Arc<dyn Store>>,
    clock: Arc<dyn Clock>,
    upstream: Option<Arc<dyn WeatherUpstream>>,
    limits: UpstreamLimits,
    swr: SwrConfig,
    request_timeout: Option<Duration>,
}

impl WeatherServiceBuilder {
    /// Create a new WeatherServiceBuilder.
    pub fn new() -> Self {
        WeatherServiceBuilder {
            store: None,
            clock: Arc::new(SystemClock),
            upstream: None,
            limits: UpstreamLimits::default(),
            swr: SwrConfig::default(),
            request_timeout: None,
        }
    }

    /// Store shared by the cache and the rate limiter. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Time source for rate windows and entry timestamps.
    ///
    /// An in-memory store created by `build` uses the same clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn upstream(mut self, upstream: Arc<dyn WeatherUpstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn limits(mut self, limits: UpstreamLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn swr_config(mut self, config: SwrConfig) -> Self {
        self.swr = config;
        self
    }

    /// Bound how long a caller waits for a lookup.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the service.
    ///
    /// Fails with `CacheError::Config` when no upstream was set.
    pub fn build(self) -> Result<WeatherService, CacheError> {
        let upstream = self
            .upstream
            .ok_or_else(|| CacheError::Config("weather upstream is required".to_string()))?;

        let clock = self.clock;
        let store: Arc<dyn Store> = match self.store {
            Some(store) => store,
            None => Arc::new(HashMapStore::new(HashMapStoreConfig::with_clock(
                clock.clone(),
            ))),
        };

        Ok(WeatherService::new(
            SwrCache::with_config(store.clone(), clock.clone(), self.swr),
            RateLimiter::with_clock(store, clock),
            upstream,
            self.limits,
            self.request_timeout,
        ))
    }

    /// Wire a service from configuration: connect the store (falling back to memory when
    /// Redis is unavailable) and create the OpenWeather client.
    pub async fn from_config(config: &WeatherConfig) -> Result<WeatherService, CacheError> {
        let store = stores::connect(&config.store).await;
        let upstream = OpenWeatherClient::new(&config.openweather)?;

        let mut builder = WeatherServiceBuilder::new()
            .store(store)
            .upstream(Arc::new(upstream))
            .limits(config.limits)
            .swr_config(config.swr.clone());

        if let Some(timeout) = config.request_timeout() {
            builder = builder.request_timeout(timeout);
        }

        builder.build()
    }
}

impl Default for WeatherServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenWeatherConfig;
    use crate::stores::StoreConfig;

    #[test]
    fn test_build_without_upstream_fails() {
        let result = WeatherServiceBuilder::new().build();
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_from_config_with_memory_store() {
        let config = WeatherConfig {
            openweather: OpenWeatherConfig {
                api_key: "secret".to_string(),
                base_url: "http://127.0.0.1:1".to_string(),
                timeout_ms: 100,
            },
            limits: UpstreamLimits::default(),
            request_timeout_ms: Some(50),
            swr: SwrConfig::default(),
            store: StoreConfig {
                use_redis: false,
                ..Default::default()
            },
        };

        let service = WeatherServiceBuilder::from_config(&config).await.unwrap();
        assert_eq!(service.buckets(Some("c")).len(), 3);
    }
}

//! weather-swr - Stale-while-revalidate caching, request deduplication and rate limiting in
//! front of a weather API
//!
//! This library provides:
//! - Stale-while-revalidate (SWR) semantics over a shared key-value store
//! - Deduplication of concurrent computations for the same key
//! - Fixed-window rate limiting over several buckets at once
//! - An OpenWeather client and a weather service wiring all of the above
//!
//! # Example
//!
//! ```ignore
//! use weather_swr::{SwrCache, HashMapStore, HashMapStoreConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
//!     let cache = SwrCache::new(store);
//!
//!     // Fresh for 3 minutes, served stale for 2 more while refreshing in the background
//!     let wind: f64 = cache
//!         .get_or_revalidate("weather:current:51.507:-0.128:metric", 180, 300, || async {
//!             Ok(5.4)
//!         })
//!         .await
//!         .unwrap();
//! }
//! ```

mod builder;
pub mod clock;
pub mod config;
mod entry;
mod error;
mod inflight;
pub mod keys;
mod rate_limit;
mod store;
pub mod stores;
mod swr;
pub mod upstream;
mod utils;
pub mod weather;

// Re-export public API
pub use builder::WeatherServiceBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OpenWeatherConfig, UpstreamLimits, WeatherConfig};
pub use entry::{CacheEntry, Freshness};
pub use error::CacheError;
pub use inflight::{InFlight, InFlightResult};
pub use rate_limit::{Bucket, RateLimiter};
pub use store::{CounterMode, Store};
pub use stores::memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use stores::redis::{RedisStore, RedisStoreConfig};
pub use stores::{StoreConfig, connect};
pub use swr::{SwrCache, SwrConfig};
pub use upstream::{OpenWeatherClient, WeatherUpstream};
pub use weather::{
    ForecastPoint, ForecastQuery, Granularity, Units, WeatherService, WeatherSummary,
    WindForecast,
};

//! Weather lookups served through the SWR cache and gated by the upstream rate limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::UpstreamLimits;
use crate::error::CacheError;
use crate::keys::{current_key, forecast_key};
use crate::rate_limit::{Bucket, RateLimiter};
use crate::swr::SwrCache;
use crate::upstream::WeatherUpstream;

/// Most forecast points the provider returns in one call (five days of 3-hour steps).
pub const MAX_FORECAST_POINTS: u32 = 40;

/// Hours between two forecast points.
pub const FORECAST_STEP_HOURS: u32 = 3;

pub const DEFAULT_RANGE_HOURS: u32 = 24;
pub const DEFAULT_DAYS: u32 = 5;

/// Global per-minute bucket for calls to the provider.
pub const OWM_MINUTE_BUCKET: &str = "owm:requests:1m";

/// Global per-hour bucket for calls to the provider.
pub const OWM_HOUR_BUCKET: &str = "owm:requests:1h";

/// Freshness and stale windows for one kind of lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub freshness_sec: u64,
    pub stale_sec: u64,
}

pub const CURRENT_TTL: TtlPolicy = TtlPolicy {
    freshness_sec: 180,
    stale_sec: 300,
};

pub const FORECAST_TTL: TtlPolicy = TtlPolicy {
    freshness_sec: 600,
    stale_sec: 900,
};

/// Measurement system requested from the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Standard,
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Standard => "standard",
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Units::Standard),
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            other => Err(CacheError::Config(format!("unknown units '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Hourly,
    Daily,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            other => Err(CacheError::Config(format!("unknown granularity '{}'", other))),
        }
    }
}

/// Current wind conditions at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub wind_speed: f64,
    pub wind_deg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_gust: Option<f64>,
    /// Observation time, unix seconds.
    pub timestamp: i64,
    pub units: Units,
}

/// Forecast request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastQuery {
    pub units: Units,
    pub granularity: Granularity,
    /// Hours ahead for hourly forecasts (defaults to 24).
    pub range_hours: Option<u32>,
    /// Days ahead for daily forecasts (defaults to 5).
    pub days: Option<u32>,
}

impl ForecastQuery {
    pub fn hourly(units: Units, range_hours: Option<u32>) -> Self {
        ForecastQuery {
            units,
            granularity: Granularity::Hourly,
            range_hours,
            days: None,
        }
    }

    pub fn daily(units: Units, days: Option<u32>) -> Self {
        ForecastQuery {
            units,
            granularity: Granularity::Daily,
            range_hours: None,
            days,
        }
    }

    pub fn effective_range_hours(&self) -> u32 {
        self.range_hours.unwrap_or(DEFAULT_RANGE_HOURS)
    }

    pub fn effective_days(&self) -> u32 {
        self.days.unwrap_or(DEFAULT_DAYS)
    }

    /// Number of 3-hour points to request from the provider.
    pub fn point_count(&self) -> u32 {
        match self.granularity {
            Granularity::Hourly => self
                .effective_range_hours()
                .div_ceil(FORECAST_STEP_HOURS)
                .min(MAX_FORECAST_POINTS),
            Granularity::Daily => self
                .effective_days()
                .saturating_mul(24 / FORECAST_STEP_HOURS)
                .min(MAX_FORECAST_POINTS),
        }
    }
}

/// One 3-hour forecast step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Forecast time, unix seconds.
    pub timestamp: i64,
    pub temperature: f64,
    pub wind_speed: f64,
    pub wind_deg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_gust: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindForecast {
    pub units: Units,
    pub granularity: Granularity,
    pub points: Vec<ForecastPoint>,
}

/// Weather lookups with caching, deduplication and upstream rate limiting.
///
/// Every upstream call first consumes from the global per-minute and per-hour buckets and,
/// when the caller identifies itself, from its own per-minute bucket. Cached responses,
/// fresh or stale, never consume quota.
#[derive(Clone)]
pub struct WeatherService {
    cache: SwrCache,
    limiter: RateLimiter,
    upstream: Arc<dyn WeatherUpstream>,
    limits: UpstreamLimits,
    request_timeout: Option<Duration>,
}

impl WeatherService {
    /// Create a new weather service. See `WeatherServiceBuilder` for the usual wiring.
    pub fn new(
        cache: SwrCache,
        limiter: RateLimiter,
        upstream: Arc<dyn WeatherUpstream>,
        limits: UpstreamLimits,
        request_timeout: Option<Duration>,
    ) -> Self {
        WeatherService {
            cache,
            limiter,
            upstream,
            limits,
            request_timeout,
        }
    }

    /// The cache backing this service.
    pub fn cache(&self) -> &SwrCache {
        &self.cache
    }

    /// The rate limiter gating upstream calls.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Buckets charged for one upstream call.
    pub fn buckets(&self, client_key: Option<&str>) -> Vec<Bucket> {
        let mut buckets = vec![
            Bucket::new(OWM_MINUTE_BUCKET, self.limits.per_minute, 60),
            Bucket::new(OWM_HOUR_BUCKET, self.limits.per_hour, 3600),
        ];
        if let Some(client) = client_key {
            buckets.push(Bucket::new(
                format!("client:{}:1m", client),
                self.limits.client_per_minute,
                60,
            ));
        }
        buckets
    }

    /// Current wind conditions at `(lat, lon)`.
    ///
    /// # Arguments
    /// * `lat`, `lon` - Coordinates; rounded to 3 decimals for the cache key only
    /// * `units` - Measurement system
    /// * `client_key` - Identifies the caller for its own per-minute limit
    pub async fn current_summary(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
        client_key: Option<&str>,
    ) -> Result<WeatherSummary, CacheError> {
        let key = current_key(lat, lon, units);
        let limiter = self.limiter.clone();
        let upstream = self.upstream.clone();
        let buckets = self.buckets(client_key);

        let lookup = self.cache.get_or_revalidate(
            &key,
            CURRENT_TTL.freshness_sec,
            CURRENT_TTL.stale_sec,
            move || async move {
                limiter.consume_multi(&buckets).await?;
                upstream.current(lat, lon, units).await
            },
        );

        self.with_deadline(lookup).await
    }

    /// Wind forecast at `(lat, lon)`.
    ///
    /// Hourly forecasts keep the first `ceil(range_hours / 3)` points. Daily forecasts return
    /// the raw 3-hour points covering the requested days.
    pub async fn wind_forecast(
        &self,
        lat: f64,
        lon: f64,
        query: &ForecastQuery,
        client_key: Option<&str>,
    ) -> Result<WindForecast, CacheError> {
        let key = forecast_key(lat, lon, query);
        let limiter = self.limiter.clone();
        let upstream = self.upstream.clone();
        let buckets = self.buckets(client_key);
        let query = query.clone();

        let lookup = self.cache.get_or_revalidate(
            &key,
            FORECAST_TTL.freshness_sec,
            FORECAST_TTL.stale_sec,
            move || async move {
                limiter.consume_multi(&buckets).await?;

                let count = query.point_count();
                let mut points = upstream.forecast(lat, lon, query.units, count).await?;
                if points.is_empty() {
                    return Err(CacheError::upstream(None, "invalid forecast data"));
                }
                points.truncate(count as usize);

                Ok(WindForecast {
                    units: query.units,
                    granularity: query.granularity,
                    points,
                })
            },
        );

        self.with_deadline(lookup).await
    }

    /// Apply the caller deadline, if any.
    ///
    /// Only the wait is bounded. The computation runs on its own task and still completes and
    /// populates the cache for later callers.
    async fn with_deadline<T>(
        &self,
        lookup: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        let Some(deadline) = self.request_timeout else {
            return lookup.await;
        };

        match tokio::time::timeout(deadline, lookup).await {
            Ok(result) => result,
            Err(_) => {
                let after_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!("Weather lookup timed out after {}ms", after_ms);
                Err(CacheError::Timeout { after_ms })
            }
        }
    }
}

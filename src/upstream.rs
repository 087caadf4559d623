//! Fetch adapter for the OpenWeather REST API.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::OpenWeatherConfig;
use crate::error::CacheError;
use crate::weather::{ForecastPoint, Units, WeatherSummary};

/// Source of weather data behind the cache.
#[async_trait]
pub trait WeatherUpstream: Send + Sync {
    /// Current conditions at `(lat, lon)`.
    async fn current(&self, lat: f64, lon: f64, units: Units)
    -> Result<WeatherSummary, CacheError>;

    /// Up to `count` 3-hour forecast points at `(lat, lon)`.
    async fn forecast(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
        count: u32,
    ) -> Result<Vec<ForecastPoint>, CacheError>;
}

#[derive(Debug, Default, Deserialize)]
struct OwmWind {
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    deg: f64,
    gust: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OwmMain {
    temp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmCurrentResponse {
    dt: i64,
    #[serde(default)]
    wind: OwmWind,
}

#[derive(Debug, Deserialize)]
struct OwmForecastItem {
    dt: i64,
    #[serde(default)]
    main: OwmMain,
    #[serde(default)]
    wind: OwmWind,
}

#[derive(Debug, Deserialize)]
struct OwmForecastResponse {
    #[serde(default)]
    list: Vec<OwmForecastItem>,
}

impl OwmCurrentResponse {
    fn into_summary(self, units: Units) -> WeatherSummary {
        WeatherSummary {
            wind_speed: self.wind.speed,
            wind_deg: self.wind.deg,
            wind_gust: self.wind.gust,
            timestamp: self.dt,
            units,
        }
    }
}

impl OwmForecastResponse {
    fn into_points(self) -> Vec<ForecastPoint> {
        self.list
            .into_iter()
            .map(|item| ForecastPoint {
                timestamp: item.dt,
                temperature: item.main.temp.unwrap_or_default(),
                wind_speed: item.wind.speed,
                wind_deg: item.wind.deg,
                wind_gust: item.wind.gust,
            })
            .collect()
    }
}

/// Map a non-success HTTP status from `endpoint` to an upstream error.
pub fn status_error(endpoint: &str, status: u16) -> CacheError {
    let message = if status == 429 {
        "rate limited by provider".to_string()
    } else {
        format!("{} request failed with status {}", endpoint, status)
    };
    CacheError::upstream(Some(status), message)
}

/// OpenWeather client over `reqwest`.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(config: &OpenWeatherConfig) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| CacheError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(OpenWeatherClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<R, CacheError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("OpenWeather {} returned status {}", endpoint, status);
            return Err(status_error(endpoint, status.as_u16()));
        }

        response.json::<R>().await.map_err(|e| {
            CacheError::upstream(
                Some(status.as_u16()),
                format!("invalid {} response: {}", endpoint, e),
            )
        })
    }
}

#[async_trait]
impl WeatherUpstream for OpenWeatherClient {
    async fn current(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<WeatherSummary, CacheError> {
        tracing::debug!("Fetching current weather: lat={}, lon={}, units={}", lat, lon, units);

        let response: OwmCurrentResponse = self
            .get_json(
                "weather",
                &[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("units", units.to_string()),
                ],
            )
            .await?;

        Ok(response.into_summary(units))
    }

    async fn forecast(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
        count: u32,
    ) -> Result<Vec<ForecastPoint>, CacheError> {
        tracing::debug!(
            "Fetching forecast: lat={}, lon={}, units={}, cnt={}",
            lat,
            lon,
            units,
            count
        );

        let response: OwmForecastResponse = self
            .get_json(
                "forecast",
                &[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("units", units.to_string()),
                    ("cnt", count.to_string()),
                ],
            )
            .await?;

        Ok(response.into_points())
    }
}

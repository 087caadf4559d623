//! Service configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CacheError;
use crate::stores::StoreConfig;
use crate::swr::SwrConfig;

pub const DEFAULT_API_URL: &str = "https://api.openweathermap.org/data/2.5";

/// OpenWeather connection settings.
#[derive(Debug, Clone)]
pub struct OpenWeatherConfig {
    /// API key (from OPENWEATHER_API_KEY, required).
    pub api_key: String,

    /// Base URL (from OPENWEATHER_API_URL, defaults to the public API).
    pub base_url: String,

    /// HTTP timeout in milliseconds (from OPENWEATHER_TIMEOUT_MS, defaults to 5000).
    pub timeout_ms: u64,
}

/// Quotas for calls to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamLimits {
    /// Global calls per minute (from OWM_LIMIT_PER_MINUTE, defaults to 120).
    pub per_minute: u64,

    /// Global calls per hour (from OWM_LIMIT_PER_HOUR, defaults to 2000).
    pub per_hour: u64,

    /// Calls per minute per client (from CLIENT_LIMIT_PER_MINUTE, defaults to 120).
    pub client_per_minute: u64,
}

impl Default for UpstreamLimits {
    fn default() -> Self {
        Self {
            per_minute: 120,
            per_hour: 2000,
            client_per_minute: 120,
        }
    }
}

/// Everything needed to wire a `WeatherService`.
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub openweather: OpenWeatherConfig,
    pub limits: UpstreamLimits,

    /// Caller-side deadline in milliseconds (from REQUEST_TIMEOUT_MS, unset by default).
    pub request_timeout_ms: Option<u64>,

    /// Refresh failure policy (from SWR_MAX_REFRESH_FAILURES, defaults to 3).
    pub swr: SwrConfig,

    pub store: StoreConfig,
}

impl WeatherConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, CacheError> {
        let mut config = Self::from_lookup(|name| env::var(name).ok())?;
        config.store = StoreConfig::from_env();
        Ok(config)
    }

    /// Build the configuration from any variable lookup.
    ///
    /// The store settings keep their defaults; `from_env` fills them in.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, CacheError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENWEATHER_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| CacheError::Config("OPENWEATHER_API_KEY is not set".to_string()))?;

        let limits = UpstreamLimits::default();

        Ok(Self {
            openweather: OpenWeatherConfig {
                api_key,
                base_url: lookup("OPENWEATHER_API_URL")
                    .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                timeout_ms: parse_or(&lookup, "OPENWEATHER_TIMEOUT_MS", 5000),
            },
            limits: UpstreamLimits {
                per_minute: parse_or(&lookup, "OWM_LIMIT_PER_MINUTE", limits.per_minute),
                per_hour: parse_or(&lookup, "OWM_LIMIT_PER_HOUR", limits.per_hour),
                client_per_minute: parse_or(
                    &lookup,
                    "CLIENT_LIMIT_PER_MINUTE",
                    limits.client_per_minute,
                ),
            },
            request_timeout_ms: lookup("REQUEST_TIMEOUT_MS").and_then(|s| s.trim().parse().ok()),
            swr: SwrConfig {
                max_refresh_failures: parse_or(
                    &lookup,
                    "SWR_MAX_REFRESH_FAILURES",
                    SwrConfig::default().max_refresh_failures,
                ),
            },
            store: StoreConfig::default(),
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_or<L, T>(lookup: &L, name: &str, default: T) -> T
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using default", name, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WeatherConfig::from_lookup(lookup(&[("OPENWEATHER_API_KEY", "secret")])).unwrap();

        assert_eq!(config.openweather.api_key, "secret");
        assert_eq!(config.openweather.base_url, DEFAULT_API_URL);
        assert_eq!(config.openweather.timeout_ms, 5000);
        assert_eq!(config.limits, UpstreamLimits::default());
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.swr.max_refresh_failures, 0);
    }

    #[test]
    fn test_missing_api_key_is_a_config_error() {
        let err = WeatherConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));

        let err = WeatherConfig::from_lookup(lookup(&[("OPENWEATHER_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = WeatherConfig::from_lookup(lookup(&[
            ("OPENWEATHER_API_KEY", "secret"),
            ("OPENWEATHER_API_URL", "http://localhost:8080"),
            ("OWM_LIMIT_PER_MINUTE", "60"),
            ("OWM_LIMIT_PER_HOUR", "lots"),
            ("REQUEST_TIMEOUT_MS", "2500"),
            ("SWR_MAX_REFRESH_FAILURES", "2"),
        ]))
        .unwrap();

        assert_eq!(config.openweather.base_url, "http://localhost:8080");
        assert_eq!(config.limits.per_minute, 60);
        assert_eq!(config.limits.per_hour, 2000);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.swr.max_refresh_failures, 2);
    }
}

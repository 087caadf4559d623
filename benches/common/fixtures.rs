use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use weather_swr::{CacheError, ForecastPoint, Units, WeatherSummary, WeatherUpstream};

/// Simulated weather provider with configurable latency
#[derive(Clone)]
pub struct FakeUpstream {
    latency_ms: u64,
    call_count: Arc<AtomicUsize>,
}

impl FakeUpstream {
    pub fn new(latency_ms: u64) -> Self {
        Self {
            latency_ms,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WeatherUpstream for FakeUpstream {
    async fn current(&self, lat: f64, lon: f64, units: Units) -> Result<WeatherSummary, CacheError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        // Simulate provider latency
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        Ok(WeatherSummary {
            wind_speed: (lat.abs() % 20.0) + 0.5,
            wind_deg: (lon + 180.0) % 360.0,
            wind_gust: None,
            timestamp: 1_700_000_000,
            units,
        })
    }

    async fn forecast(
        &self,
        _lat: f64,
        _lon: f64,
        _units: Units,
        count: u32,
    ) -> Result<Vec<ForecastPoint>, CacheError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        Ok((0..count)
            .map(|i| ForecastPoint {
                timestamp: 1_700_000_000 + i64::from(i) * 10_800,
                temperature: 10.0,
                wind_speed: 4.0,
                wind_deg: 200.0,
                wind_gust: Some(8.0),
            })
            .collect())
    }
}

/// Generate coordinates for different workload patterns
pub struct LocationGenerator {
    num_locations: usize,
}

impl LocationGenerator {
    pub fn new(num_locations: usize) -> Self {
        Self { num_locations }
    }

    fn location(i: usize) -> (f64, f64) {
        // Spaced well apart so every location gets its own cache key
        (-60.0 + (i % 120) as f64, -170.0 + (i / 120) as f64 * 0.5)
    }

    /// Every location once (for cold cache tests)
    pub fn sequential(&self) -> Vec<(f64, f64)> {
        (0..self.num_locations).map(Self::location).collect()
    }

    /// Locations for a mixed workload (some hits, some misses)
    pub fn mixed(&self, hit_ratio: f64) -> Vec<(f64, f64)> {
        let mut rng = rand::thread_rng();
        let hot_count = ((self.num_locations as f64 * hit_ratio) as usize).max(1);

        (0..1000)
            .map(|_| {
                if rng.gen_bool(hit_ratio) || hot_count >= self.num_locations {
                    Self::location(rng.gen_range(0..hot_count))
                } else {
                    Self::location(rng.gen_range(hot_count..self.num_locations))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    async fn test_fake_upstream() {
        use super::FakeUpstream;
        use weather_swr::{Units, WeatherUpstream};

        let upstream = FakeUpstream::new(1);

        let summary = upstream.current(51.5, -0.1, Units::Metric).await.unwrap();
        assert_eq!(summary.units, Units::Metric);

        assert_eq!(upstream.call_count(), 1);
    }

    #[test]
    fn test_location_generator() {
        use super::LocationGenerator;

        let locations = LocationGenerator::new(500);

        let seq = locations.sequential();
        assert_eq!(seq.len(), 500);
        assert_eq!(seq[0], (-60.0, -170.0));

        let mixed = locations.mixed(0.8);
        assert_eq!(mixed.len(), 1000);
    }
}

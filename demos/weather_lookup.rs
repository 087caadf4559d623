//! Example looking up current wind conditions and a short forecast through the cache.
//!
//! Reads its configuration from the environment (OPENWEATHER_API_KEY is required, Redis is
//! used when reachable). Run with `RUST_LOG=weather_swr=debug` to watch cache transitions.
//!
//! ```text
//! OPENWEATHER_API_KEY=... cargo run --example weather_lookup -- 51.5074 -0.1278
//! ```

use std::env;
use tracing_subscriber::EnvFilter;
use weather_swr::{ForecastQuery, Units, WeatherConfig, WeatherServiceBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let lat: f64 = args.next().as_deref().unwrap_or("51.5074").parse()?;
    let lon: f64 = args.next().as_deref().unwrap_or("-0.1278").parse()?;

    let config = WeatherConfig::from_env()?;
    let service = WeatherServiceBuilder::from_config(&config).await?;

    // The second lookup is served from the cache
    for attempt in 1..=2 {
        let summary = service
            .current_summary(lat, lon, Units::Metric, Some("demo"))
            .await?;
        println!(
            "[{}] wind {:.1} m/s from {:.0} deg (gust {:?}) at {}",
            attempt, summary.wind_speed, summary.wind_deg, summary.wind_gust, summary.timestamp
        );
    }

    let forecast = service
        .wind_forecast(lat, lon, &ForecastQuery::hourly(Units::Metric, Some(12)), Some("demo"))
        .await?;
    for point in &forecast.points {
        println!(
            "{}: {:.1} m/s at {:.0} deg, {:.1} C",
            point.timestamp, point.wind_speed, point.wind_deg, point.temperature
        );
    }

    Ok(())
}

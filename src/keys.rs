//! Deterministic cache keys for weather lookups.

use std::fmt::Write;

use crate::weather::{ForecastQuery, Granularity, Units};

/// Decimal places kept from each coordinate.
pub const COORDINATE_PRECISION: i32 = 3;

/// Round a coordinate to three decimals, half up, so that jitter in the last digits of a
/// client's position does not fragment the cache.
pub fn round_coordinate(n: f64) -> f64 {
    let scale = 10f64.powi(COORDINATE_PRECISION);
    // `+ 0.0` turns -0 into 0
    (n * scale + 0.5).floor() / scale + 0.0
}

/// `weather:current:{lat}:{lon}:{units}`
pub fn current_key(lat: f64, lon: f64, units: Units) -> String {
    format!(
        "weather:current:{}:{}:{}",
        round_coordinate(lat),
        round_coordinate(lon),
        units
    )
}

/// `weather:forecast:{lat}:{lon}:{granularity}:{units}:{range_hours}:{range_days}`
///
/// Only the range matching the granularity is filled in; the other segment is empty.
pub fn forecast_key(lat: f64, lon: f64, query: &ForecastQuery) -> String {
    let mut key = format!(
        "weather:forecast:{}:{}:{}:{}:",
        round_coordinate(lat),
        round_coordinate(lon),
        query.granularity,
        query.units
    );

    match query.granularity {
        Granularity::Hourly => {
            let _ = write!(key, "{}:", query.effective_range_hours());
        }
        Granularity::Daily => {
            let _ = write!(key, ":{}", query.effective_days());
        }
    }

    key
}

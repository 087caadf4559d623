use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::CacheError;
use crate::utils::build_cache_key;

/// Prefix of the store key holding the serialized value (TTL = stale window).
pub const VALUE_PREFIX: &str = "val";

/// Prefix of the store key holding the freshness flag (TTL = freshness window).
pub const FRESH_PREFIX: &str = "fresh";

/// Payload written under the freshness key while the entry is fresh.
pub const FRESH_FLAG: &str = "true";

/// A cached value and the time it was computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,

    /// Unix timestamp in seconds at which the value was stored.
    pub stored_at: i64,
}

/// Observed state of a logical cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Value and freshness flag are both present.
    Fresh,
    /// Value is present but the freshness flag has expired. Usable while revalidating.
    Stale,
    /// No usable value.
    Miss,
}

impl<V> CacheEntry<V> {
    /// Create a new cache entry.
    pub fn new(value: V, stored_at: i64) -> Self {
        CacheEntry { value, stored_at }
    }

    /// Seconds elapsed since the entry was stored.
    pub fn age_secs(&self, now_secs: i64) -> i64 {
        (now_secs - self.stored_at).max(0)
    }
}

impl<V: Serialize> CacheEntry<V> {
    /// Serialize the entry for storage.
    pub fn encode(&self) -> Result<String, CacheError> {
        serde_json::to_string(self)
            .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e)))
    }
}

impl<V: DeserializeOwned> CacheEntry<V> {
    /// Deserialize an entry read from the store under `key`.
    pub fn decode(key: &str, data: &str) -> Result<Self, CacheError> {
        serde_json::from_str(data).map_err(|e| CacheError::InvalidCachedData {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

/// Store key of the value for a logical cache key.
pub fn value_key(key: &str) -> String {
    build_cache_key(&VALUE_PREFIX, key)
}

/// Store key of the freshness flag for a logical cache key.
pub fn fresh_key(key: &str) -> String {
    build_cache_key(&FRESH_PREFIX, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Forecast {
        speeds: Vec<Vec<f64>>,
        gust: Option<f64>,
        timestamp: i64,
    }

    #[test]
    fn test_encode_decode_preserves_nested_numbers() {
        let entry = CacheEntry::new(
            Forecast {
                speeds: vec![vec![5.4, 0.1], vec![], vec![-3.25]],
                gust: None,
                timestamp: 1_700_000_123,
            },
            42,
        );

        let data = entry.encode().unwrap();
        let decoded: CacheEntry<Forecast> = CacheEntry::decode("k", &data).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_decode_garbage_is_invalid_cached_data() {
        let err = CacheEntry::<Forecast>::decode("weather:x", "{not json").unwrap_err();
        match err {
            CacheError::InvalidCachedData { key, .. } => assert_eq!(key, "weather:x"),
            other => panic!("Expected InvalidCachedData, got {other:?}"),
        }
    }

    #[test]
    fn test_store_keys() {
        assert_eq!(value_key("a:b"), "val:a:b");
        assert_eq!(fresh_key("a:b"), "fresh:a:b");
    }

    #[test]
    fn test_age_never_negative() {
        let entry = CacheEntry::new(1u8, 100);
        assert_eq!(entry.age_secs(160), 60);
        assert_eq!(entry.age_secs(50), 0);
    }
}

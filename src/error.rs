/// Error type for cache, rate limiting and upstream operations.
///
/// The type is `Clone` because a single deduplicated computation hands the same result to
/// every caller that joined it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// A store operation failed.
    #[error("[{tier}] cache error for key '{key}': {message}")]
    Operation {
        tier: String,
        key: String,
        message: String,
    },
    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A stored value could not be decoded. The coordinator treats this as a miss.
    #[error("invalid cached data for key '{key}': {message}")]
    InvalidCachedData { key: String, message: String },
    /// A rate limit bucket is over quota for the current window.
    ///
    /// Callers must back off; retrying within the same window fails again.
    #[error("rate limit exceeded for bucket '{bucket}' ({limit} per {window_sec}s)")]
    RateLimitExceeded {
        bucket: String,
        limit: u64,
        window_sec: u64,
    },
    /// The weather provider answered with a non-2xx status or could not be reached.
    #[error("upstream unavailable: {message}")]
    Upstream {
        status_code: Option<u16>,
        message: String,
    },
    /// The caller's deadline elapsed before a result was ready.
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    /// Invalid configuration or arguments.
    #[error("configuration error: {0}")]
    Config(String),
    /// An in-flight computation panicked or was aborted before settling.
    #[error("in-flight computation for '{0}' did not complete")]
    Cancelled(String),
}

impl CacheError {
    /// Create a new operation error.
    pub fn operation(
        tier: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Operation {
            tier: tier.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new upstream error.
    pub fn upstream(status_code: Option<u16>, message: impl Into<String>) -> Self {
        CacheError::Upstream {
            status_code,
            message: message.into(),
        }
    }

    /// Whether this error came from a rate limit bucket.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CacheError::RateLimitExceeded { .. })
    }

    /// HTTP status attached to an upstream failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CacheError::Upstream { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Upstream {
            status_code: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

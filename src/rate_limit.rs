//! Fixed-window rate limiting over named buckets kept in a shared store.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::store::{CounterMode, Store};
use crate::utils::build_cache_key;

/// One rate limit: at most `limit` calls per aligned window of `window_sec` seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub key: String,
    pub limit: u64,
    pub window_sec: u64,
}

impl Bucket {
    pub fn new(key: impl Into<String>, limit: u64, window_sec: u64) -> Self {
        Bucket {
            key: key.into(),
            limit,
            window_sec,
        }
    }
}

/// Fixed-window counters.
///
/// Windows are aligned to multiples of `window_sec` since the UNIX epoch, and each window has its
/// own counter key `{bucket}:{window_start}` which expires on its own. Counters are never
/// deleted explicitly.
///
/// When the store reports `CounterMode::Atomic` the count is maintained with an atomic
/// increment, so the limit holds across every process sharing the store. Otherwise the
/// limiter reads the counter and writes it back, and concurrent writers can lose updates and
/// admit more than `limit` calls per window. Only use such stores with a single writer or under
/// low contention.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter on the system clock.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        if store.counter_mode() == CounterMode::ReadModifyWrite {
            tracing::warn!(
                "Store '{}' has no atomic increment, rate limits are approximate under concurrency",
                store.name()
            );
        }
        RateLimiter { store, clock }
    }

    /// Start of the window containing `now_secs`.
    pub fn window_start(now_secs: i64, window_sec: u64) -> i64 {
        let window = i64::try_from(window_sec).unwrap_or(i64::MAX);
        now_secs.div_euclid(window) * window
    }

    /// Store key of the counter for `bucket_key` in the window containing `now_secs`.
    pub fn counter_key(bucket_key: &str, window_sec: u64, now_secs: i64) -> String {
        build_cache_key(&bucket_key, &Self::window_start(now_secs, window_sec).to_string())
    }

    /// Consume one unit from `bucket_key`.
    ///
    /// Fails with `RateLimitExceeded` when the bucket is over quota for the current window.
    /// The caller must not retry within the same window.
    pub async fn consume(
        &self,
        bucket_key: &str,
        limit: u64,
        window_sec: u64,
    ) -> Result<(), CacheError> {
        if window_sec == 0 {
            return Err(CacheError::Config(format!(
                "rate limit bucket '{}' has a zero-length window",
                bucket_key
            )));
        }

        let now = self.clock.now_secs();
        let counter_key = Self::counter_key(bucket_key, window_sec, now);

        let allowed = match self.store.counter_mode() {
            CounterMode::Atomic => self.consume_atomic(&counter_key, limit, window_sec).await?,
            CounterMode::ReadModifyWrite => {
                let window_end = Self::window_start(now, window_sec) + window_sec as i64;
                let remaining = (window_end - now).max(1) as u64;
                self.consume_read_modify_write(&counter_key, limit, remaining)
                    .await?
            }
        };

        if !allowed {
            tracing::debug!(
                "Rate limit exceeded: bucket={}, limit={}, window_sec={}",
                bucket_key,
                limit,
                window_sec
            );
            return Err(CacheError::RateLimitExceeded {
                bucket: bucket_key.to_string(),
                limit,
                window_sec,
            });
        }

        Ok(())
    }

    /// Consume one unit from a bucket.
    pub async fn consume_bucket(&self, bucket: &Bucket) -> Result<(), CacheError> {
        self.consume(&bucket.key, bucket.limit, bucket.window_sec)
            .await
    }

    /// Consume one unit from every bucket, tightest window first.
    ///
    /// Stops at the first exceeded bucket, so a burst limit fails before longer windows are
    /// charged. A bucket that fails is never incremented, so nothing needs rolling back.
    pub async fn consume_multi(&self, buckets: &[Bucket]) -> Result<(), CacheError> {
        let mut sorted: Vec<&Bucket> = buckets.iter().collect();
        sorted.sort_by_key(|b| b.window_sec);

        for bucket in sorted {
            self.consume_bucket(bucket).await?;
        }

        Ok(())
    }

    /// Calls counted so far in the current window of `bucket_key`.
    ///
    /// On `CounterMode::Atomic` stores every attempt is counted, rejected ones included, so
    /// the result can exceed the limit once callers have been turned away. Read-modify-write
    /// stores only count admitted calls and never report more than the limit.
    pub async fn current_count(&self, bucket_key: &str, window_sec: u64) -> Result<u64, CacheError> {
        if window_sec == 0 {
            return Ok(0);
        }
        let counter_key = Self::counter_key(bucket_key, window_sec, self.clock.now_secs());
        Ok(self.read_counter(&counter_key).await?.max(0) as u64)
    }

    async fn consume_atomic(
        &self,
        counter_key: &str,
        limit: u64,
        window_sec: u64,
    ) -> Result<bool, CacheError> {
        if limit == 0 {
            return Ok(false);
        }

        let count = self.store.increment(counter_key).await?;
        if count == 1 {
            self.store.expire(counter_key, window_sec).await?;
        }

        Ok(count <= clamp_limit(limit))
    }

    async fn consume_read_modify_write(
        &self,
        counter_key: &str,
        limit: u64,
        remaining_secs: u64,
    ) -> Result<bool, CacheError> {
        let current = self.read_counter(counter_key).await?;
        if current >= clamp_limit(limit) {
            return Ok(false);
        }

        self.store
            .set(counter_key, (current + 1).to_string(), remaining_secs)
            .await?;

        Ok(true)
    }

    async fn read_counter(&self, counter_key: &str) -> Result<i64, CacheError> {
        let Some(raw) = self.store.get(counter_key).await? else {
            return Ok(0);
        };

        match raw.trim().parse() {
            Ok(count) => Ok(count),
            Err(_) => {
                tracing::warn!(
                    "Ignoring non-integer rate limit counter: key={}, value={}",
                    counter_key,
                    raw
                );
                Ok(0)
            }
        }
    }
}

fn clamp_limit(limit: u64) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

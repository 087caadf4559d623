//! Time sources.
//!
//! Everything that reasons about expiry or rate windows reads time through a [`Clock`] so that
//! tests can move time forward deterministically instead of sleeping.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock time in milliseconds since the UNIX epoch.
pub trait Clock: Debug + Send + Sync {
    /// Current time in milliseconds since the UNIX epoch.
    fn now_ms(&self) -> i64;

    /// Current time in whole seconds since the UNIX epoch.
    fn now_secs(&self) -> i64 {
        self.now_ms().div_euclid(1000)
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to.
///
/// # Example
/// ```ignore
/// let clock = Arc::new(ManualClock::new(1_700_000_000_000));
/// clock.advance(Duration::from_secs(200));
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start_ms`.
    pub fn new(start_ms: i64) -> Self {
        ManualClock {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_positive() {
        assert!(SystemClock.now_ms() > 0);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(60_500);
        assert_eq!(clock.now_secs(), 60);

        clock.advance(Duration::from_secs(200));
        assert_eq!(clock.now_ms(), 260_500);

        clock.set_ms(-1);
        assert_eq!(clock.now_secs(), -1);
    }
}

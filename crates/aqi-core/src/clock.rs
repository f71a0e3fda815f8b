//! Time sources for the engine.
//!
//! The engine never reads the wall clock directly. It asks a [`Clock`], so
//! tests can drive window eviction deterministically with a [`ManualClock`].

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use time::OffsetDateTime;

/// A source of the current time.
///
/// # Example
///
/// ```
/// use aqi_core::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::at_unix(1_700_000_000);
/// let before = clock.now();
/// clock.advance(Duration::from_secs(60));
/// assert_eq!((clock.now() - before).whole_seconds(), 60);
/// ```
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant in UTC.
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at a Unix timestamp (seconds).
    ///
    /// Out-of-range timestamps fall back to the Unix epoch.
    pub fn at_unix(secs: i64) -> Self {
        Self::new(OffsetDateTime::from_unix_timestamp(secs).unwrap_or(OffsetDateTime::UNIX_EPOCH))
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self
            .now
            .lock()
            .expect("clock lock poisoned - a thread panicked while holding the lock");
        *now += by;
    }

    /// Set the clock to an arbitrary instant, including one in the past.
    pub fn set(&self, to: OffsetDateTime) {
        *self
            .now
            .lock()
            .expect("clock lock poisoned - a thread panicked while holding the lock") = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self
            .now
            .lock()
            .expect("clock lock poisoned - a thread panicked while holding the lock")
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::at_unix(1_000);
        assert_eq!(clock.now().unix_timestamp(), 1_000);

        clock.advance(Duration::from_millis(1_500));
        assert_eq!((clock.now().unix_timestamp_nanos() / 1_000_000), 1_001_500);

        clock.set(OffsetDateTime::from_unix_timestamp(10).unwrap());
        assert_eq!(clock.now().unix_timestamp(), 10);
    }

    #[test]
    fn test_system_clock_is_recent() {
        let now = SystemClock.now();
        assert!(now.year() >= 2024);
    }
}

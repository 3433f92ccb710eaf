//! Clock abstraction used for record expiry.

use chrono::{DateTime, Duration, Utc};

/// Abstraction over system time so record expiry can be tested deterministically.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the instant a record written now with `ttl_seconds` expires.
    fn expiry(&self, ttl_seconds: Option<i32>) -> Option<DateTime<Utc>> {
        ttl_seconds.map(|secs| self.now() + Duration::seconds(i64::from(secs)))
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

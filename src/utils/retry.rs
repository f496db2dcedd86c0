//! Retry policies built on `backon`.
//!
//! The only retry loop in the crate is the status poll that waits for a
//! newly created table to become active. It uses a constant delay so the
//! total wait is bounded by `max_attempts * interval`.

use std::time::Duration;

use backon::ConstantBuilder;

/// Default status checks after the first one while a table is being created.
pub const TABLE_CREATION_MAX_ATTEMPTS: usize = 10;

/// Default delay between status checks while a table is being created.
pub const TABLE_CREATION_INTERVAL: Duration = Duration::from_secs(5);

/// Fixed-interval retry policy.
///
/// `max_attempts` counts retries after the initial call, so a policy of
/// `(10, 5s)` makes at most 11 calls and sleeps at most 50s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Standard policy for waiting on table creation.
    ///
    /// - Max attempts: 10
    /// - Interval: 5s
    pub fn table_creation() -> Self {
        Self::new(TABLE_CREATION_MAX_ATTEMPTS, TABLE_CREATION_INTERVAL)
    }

    /// Zero-delay policy, for tests against in-memory clients.
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Backoff builder for `backon::Retryable`.
    pub fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.interval)
            .with_max_times(self.max_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::table_creation()
    }
}

//! Fixed-interval retry policy
//!
//! Bounded attempts with a constant pause between them, expressed as a
//! [`backoff::backoff::Backoff`] so it plugs into `backoff::future::retry_notify`.

use backoff::backoff::Backoff;
use std::time::Duration;

/// How many times to try an operation and how long to wait between tries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Pause between consecutive attempts
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    /// A backoff that allows `attempts - 1` retries
    pub fn backoff(&self) -> FixedRetries {
        FixedRetries::new(self.attempts.saturating_sub(1), self.interval)
    }
}

/// Yields the same interval a fixed number of times, then gives up
#[derive(Debug, Clone)]
pub struct FixedRetries {
    interval: Duration,
    retries: u32,
    remaining: u32,
}

impl FixedRetries {
    pub fn new(retries: u32, interval: Duration) -> Self {
        Self {
            interval,
            retries,
            remaining: retries,
        }
    }
}

impl Backoff for FixedRetries {
    fn reset(&mut self) {
        self.remaining = self.retries;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_retries_exhaust() {
        let mut backoff = RetryPolicy::new(3, Duration::from_millis(250)).backoff();

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(250)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(250)));
        assert_eq!(backoff.next_backoff(), None);

        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_single_attempt_never_sleeps() {
        let mut backoff = RetryPolicy::new(1, Duration::from_secs(1)).backoff();
        assert_eq!(backoff.next_backoff(), None);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }
}

//! # Fibonacci Backoff
//!
//! Progressive retry delay for failed reconciliation passes. Grows more slowly
//! than exponential backoff, so a resource waiting on a slow provider (droplet
//! still booting, rate limit) is retried often at first without hammering the API.
//!
//! Sequence with the defaults (5s, 300s): 5s, 5s, 10s, 15s, 25s, 40s, 65s, 105s, 170s, 275s, 300s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max_seconds`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff value in seconds
    prev_seconds: u64,
    /// Current backoff value in seconds
    current_seconds: u64,
    /// Maximum backoff value in seconds
    max_seconds: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with the given bounds in seconds
    ///
    /// # Arguments
    ///
    /// * `min_seconds` - Used for the first two values
    /// * `max_seconds` - Caps the sequence
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds,
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_seconds;

        let next = self.prev_seconds.saturating_add(self.current_seconds);
        self.prev_seconds = self.current_seconds;
        self.current_seconds = std::cmp::min(next, self.max_seconds);

        result
    }

    /// Get the next backoff duration as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }
}

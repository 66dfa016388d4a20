//! # Fibonacci Backoff
//!
//! Delay sequence used between retries of a failed request. It grows more
//! slowly than exponential backoff so a handful of retries stays well inside
//! the breaker cool-down.
//!
//! With a 250ms base and 2s cap: 250ms, 250ms, 500ms, 750ms, 1250ms, 2000ms (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at `max_millis`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Base delay in milliseconds (first two values, and reset target)
    min_millis: u64,
    prev_millis: u64,
    current_millis: u64,
    /// Cap in milliseconds
    max_millis: u64,
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(250, 2_000)
    }
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min_millis` and capped at `max_millis`
    #[must_use]
    pub fn new(min_millis: u64, max_millis: u64) -> Self {
        Self {
            min_millis,
            prev_millis: 0,
            current_millis: min_millis,
            max_millis,
        }
    }

    /// Return the current delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_millis;

        let next = self.prev_millis.saturating_add(self.current_millis);
        self.prev_millis = self.current_millis;
        self.current_millis = std::cmp::min(next, self.max_millis);

        Duration::from_millis(result)
    }

    /// Restart from the base delay
    pub fn reset(&mut self) {
        self.prev_millis = 0;
        self.current_millis = self.min_millis;
    }
}

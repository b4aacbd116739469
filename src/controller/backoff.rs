//! # Fibonacci Backoff
//!
//! Delay before retrying a reconciliation pass that could not run (namespace
//! enumeration or discovery failed). The sequence is the Fibonacci series
//! scaled by `min`: 1, 1, 2, 3, 5, 8 ... capped at `max`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    max: Duration,
    attempts: u32,
}

impl FibonacciBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            attempts: 0,
        }
    }

    /// Delay for the next retry; advances the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = Self::calculate_for_error_count(self.attempts, self.min, self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Back to the start of the sequence after a successful pass
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Backoff for the `error_count`-th consecutive error (0-indexed)
    pub fn calculate_for_error_count(error_count: u32, min: Duration, max: Duration) -> Duration {
        let (mut previous, mut current) = (0u32, 1u32);
        for _ in 0..error_count {
            let next = previous.saturating_add(current);
            previous = current;
            current = next;
            // Everything past this point is capped anyway
            if min.saturating_mul(current) >= max {
                break;
            }
        }
        min.saturating_mul(current).min(max)
    }
}

//! Retry schedule for bulk flushes.

use std::time::Duration;

/// Exponential backoff with a bounded number of attempts.
///
/// Attempt `n` (1-based) that fails is followed by a delay of
/// `initial_delay * multiplier^(n - 1)`, capped at `max_delay`. No delay
/// follows the last attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Exponential policy with the default multiplier and cap.
    pub fn exponential(initial_delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Self::default()
        }
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt, or `None` if that was
    /// the last one.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }

        let factor = self.multiplier.max(1.0).powi(attempt as i32 - 1);
        let nanos = (self.initial_delay.as_nanos() as f64 * factor).round() as u64;
        Some(Duration::from_nanos(nanos).min(self.max_delay))
    }

    /// Every delay of a run that fails all attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.max_attempts).filter_map(move |attempt| self.delay_after(attempt))
    }
}

//! Reconnect delay schedule.

use std::time::Duration;

use crate::protocol_constants::{RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS};

/// Exponential backoff: `min(base * 2^(N-1), max)` for the Nth consecutive failure.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            Duration::from_millis(RECONNECT_MAX_DELAY_MS),
        )
    }
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
        }
    }

    /// Records a failure and returns how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        // 2^31 already dwarfs any sane cap.
        let exponent = (self.failures - 1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Clears the failure count after a successful connect.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Number of consecutive failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

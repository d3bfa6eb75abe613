//! Reconnect policy for the live-update channel.
//!
//! Delays grow exponentially from `initial_delay` up to `max_delay`. After
//! `max_attempts` consecutive failures the channel is considered degraded,
//! but retries continue at the capped delay.

use std::time::Duration;

/// Default initial delay after the first failure (500ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;

/// Default delay cap (30 seconds).
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default consecutive failures before connectivity is reported degraded.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default multiplier applied per failure.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Consecutive failures tolerated before signalling degraded connectivity.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        ReconnectPolicy {
            initial_delay,
            max_delay,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt `failures` (1 = after the first failure).
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi((failures - 1).min(i32::MAX as u32) as i32);
        let delay_ms = self.initial_delay.as_millis() as f64 * factor;
        let capped = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// True once `failures` consecutive failures reach the degraded threshold.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

/// Running failure count for one subscription.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Backoff {
            policy,
            failures: 0,
        }
    }

    /// Record a failure and return the delay before the next attempt.
    pub fn fail(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.policy.delay_for_attempt(self.failures)
    }

    /// Clear the failure count after a successful connect.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_exhausted(&self) -> bool {
        self.policy.is_exhausted(self.failures)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_delay_doubles() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(30), 5);
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 5);
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_exhaustion_and_reset() {
        let mut backoff = Backoff::new(ReconnectPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(50),
            3,
        ));
        assert_eq!(backoff.fail(), Duration::from_millis(10));
        assert_eq!(backoff.fail(), Duration::from_millis(20));
        assert!(!backoff.is_exhausted());
        assert_eq!(backoff.fail(), Duration::from_millis(40));
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.fail(), Duration::from_millis(50));

        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert!(!backoff.is_exhausted());
    }
}

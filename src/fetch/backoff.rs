//! Jittered exponential backoff.

use std::time::Duration;

use rand::Rng;

use crate::models::RateLimitConfig;

/// Largest exponent applied to the initial delay.
const MAX_EXPONENT: u32 = 20;

/// Retry delay and budget calculator.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    max_retries: u32,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            initial,
            max,
            max_retries,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
            config.max_retries,
        )
    }

    /// Upper bound of the delay for `attempt`, before jitter.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_EXPONENT);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Delay before retry number `attempt + 1`, uniformly in `[ceiling/2, ceiling]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        let floor = ceiling / 2;
        let jittered = rand::rng().random_range(floor..=ceiling);
        Duration::from_millis(jittered)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(2_000), Duration::from_millis(120_000), 5)
    }

    #[test]
    fn test_first_delay_within_half_and_full_initial() {
        let policy = policy();
        for _ in 0..200 {
            let delay = policy.delay(0);
            assert!(delay >= Duration::from_millis(1_000), "{delay:?}");
            assert!(delay <= Duration::from_millis(2_000), "{delay:?}");
        }
    }

    #[test]
    fn test_second_delay_within_initial_and_double() {
        let policy = policy();
        for _ in 0..200 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_millis(2_000), "{delay:?}");
            assert!(delay <= Duration::from_millis(4_000), "{delay:?}");
        }
    }

    #[test]
    fn test_large_attempts_are_capped() {
        let policy = policy();
        for attempt in [7, 20, 21, 63, u32::MAX] {
            assert!(policy.delay(attempt) <= Duration::from_millis(120_000));
            assert_eq!(policy.ceiling(attempt), Duration::from_millis(120_000));
        }
    }

    #[test]
    fn test_retry_budget() {
        let policy = policy();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }
}

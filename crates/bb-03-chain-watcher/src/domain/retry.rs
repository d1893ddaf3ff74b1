//! Retry bound and exponential backoff for retryable broadcast failures.
//!
//! `attempt` is the record's retry counter before the failure being handled:
//! the first failed broadcast (attempt 0) waits `base`, the next `2 * base`,
//! and so on, capped at `max`.

use super::config::WatcherConfig;
use std::time::Duration;

/// Shift cap so the multiplier cannot overflow.
const MAX_SHIFT: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: config.backoff_base,
            max: config.backoff_max,
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        std::cmp::min(
            self.base.saturating_mul(1 << attempt.min(MAX_SHIFT)),
            self.max,
        )
    }

    /// What to do after a retryable failure at `attempt`.
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            attempt: attempt + 1,
            delay: self.backoff(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = policy();
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(4000));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn test_gives_up_at_bound() {
        let policy = policy();
        assert_eq!(
            policy.decide(0),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(500)
            }
        );
        assert!(matches!(policy.decide(2), RetryDecision::Retry { attempt: 3, .. }));
        assert_eq!(policy.decide(3), RetryDecision::GiveUp);
    }

    proptest! {
        #[test]
        fn prop_backoff_never_exceeds_max(attempt in 0u32..1_000) {
            prop_assert!(policy().backoff(attempt) <= Duration::from_secs(30));
        }

        #[test]
        fn prop_backoff_is_monotonic(attempt in 0u32..100) {
            let policy = policy();
            prop_assert!(policy.backoff(attempt) <= policy.backoff(attempt + 1));
        }
    }
}

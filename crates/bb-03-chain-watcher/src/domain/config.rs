//! Watcher tuning knobs.

use super::errors::WatcherError;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Blocks, counting the inclusion block, before a write is Confirmed.
    pub confirmation_depth: u64,
    /// Measured from `broadcast_at`.
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    /// Upper bound on any single contract call.
    pub rpc_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub workers: usize,
    pub reconcile_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            confirmation_depth: 2,
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            rpc_timeout: Duration::from_secs(15),
            max_retries: 5,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            workers: 4,
            reconcile_interval: Duration::from_secs(30),
        }
    }
}

impl WatcherConfig {
    /// Millisecond-scale timings for tests against a simulated chain.
    pub fn for_testing() -> Self {
        Self {
            confirmation_depth: 1,
            confirmation_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            rpc_timeout: Duration::from_secs(1),
            max_retries: 3,
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_millis(50),
            workers: 2,
            reconcile_interval: Duration::from_millis(50),
        }
    }

    pub fn validate(&self) -> Result<(), WatcherError> {
        if self.confirmation_depth == 0 {
            return Err(WatcherError::InvalidConfig(
                "confirmation_depth must be at least 1".into(),
            ));
        }
        if self.workers == 0 {
            return Err(WatcherError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.poll_interval.is_zero() || self.confirmation_timeout <= self.poll_interval {
            return Err(WatcherError::InvalidConfig(
                "confirmation_timeout must exceed a non-zero poll_interval".into(),
            ));
        }
        if self.backoff_base > self.backoff_max {
            return Err(WatcherError::InvalidConfig(
                "backoff_base must not exceed backoff_max".into(),
            ));
        }
        Ok(())
    }
}

//! Read cache configuration.

use super::errors::CacheError;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Must match the watcher's depth; reads never go above
    /// `head - confirmation_depth + 1`.
    pub confirmation_depth: u64,
    /// Entries older than this are refetched. `None` keeps entries until a
    /// confirmation invalidates them.
    pub max_age: Option<Duration>,
    pub max_entries: usize,
    pub rpc_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            confirmation_depth: 2,
            max_age: None,
            max_entries: 10_000,
            rpc_timeout: Duration::from_secs(15),
        }
    }
}

impl CacheConfig {
    pub fn for_testing() -> Self {
        Self {
            confirmation_depth: 1,
            max_age: None,
            max_entries: 64,
            rpc_timeout: Duration::from_secs(1),
        }
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.confirmation_depth == 0 {
            return Err(CacheError::InvalidConfig(
                "confirmation_depth must be at least 1".into(),
            ));
        }
        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig("max_entries must be at least 1".into()));
        }
        Ok(())
    }
}

//! Domain layer for the chain watcher.

pub mod config;
pub mod errors;
pub mod outcome;
pub mod retry;

pub use config::WatcherConfig;
pub use errors::WatcherError;
pub use outcome::{CycleOutcome, ReconcileOutcome, RecoveryReport, TrackOutcome};
pub use retry::{RetryDecision, RetryPolicy};

//! # Chain Watcher Subsystem
//!
//! **Subsystem ID:** 3
//!
//! ## Purpose
//!
//! Takes ready Pending records from the submission queue, broadcasts their
//! contract calls and follows each transaction until it is Confirmed or
//! Failed. Also settles timed-out records once the chain has moved on.
//!
//! ## Guarantees
//!
//! | Guarantee | Enforcement Location |
//! |-----------|---------------------|
//! | One nonce per broadcast, never shared by two Submitted records | `nonce.rs`, `service.rs` - `allocate_nonce()` + store nonce index |
//! | Only the worker that wins the Pending → Submitted CAS broadcasts | `service.rs` - `process()` |
//! | Retryable errors retried with bounded exponential backoff | `domain/retry.rs` |
//! | Reverts fail at once without consuming a retry | `service.rs` - `on_broadcast_error()` |
//! | Confirmed only at the configured depth | `service.rs` - `is_deep_enough()` |
//! | A timeout is never reported as a revert | `service.rs` - `track()` |
//! | Timed-out records are kept until reconciled | `service.rs` - `fail()`, `reconcile_record()` |
//!
//! ## Cycle
//!
//! ```text
//! next_ready ──→ allocate nonce ──→ CAS Pending→Submitted ──→ broadcast
//!                                                               │
//!        ┌──── retryable: CAS → Pending, requeue(backoff) ──────┤
//!        │                                                      ├── revert: Failed
//!        ↓                                                      ↓
//!     (queue)                                        poll receipt every poll_interval
//!                                                        │        │          │
//!                                               reverted │   depth reached   │ deadline
//!                                                        ↓        ↓          ↓
//!                                                     Failed  Confirmed  Failed(Timeout)
//!                                                                            │
//!                                                              reconcile ────┘
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod nonce;
pub mod ports;
pub mod service;

pub use domain::{
    CycleOutcome, ReconcileOutcome, RecoveryReport, RetryPolicy, TrackOutcome, WatcherConfig,
    WatcherError,
};
pub use nonce::NonceManager;
pub use ports::{WatcherApi, WatcherStats};
pub use service::ChainWatcher;

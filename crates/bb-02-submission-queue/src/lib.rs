//! # Submission Queue Subsystem
//!
//! **Subsystem ID:** 2
//!
//! ## Purpose
//!
//! Entry point for every write. Validates it, persists it as Pending in the
//! fingerprint store and queues its id for the chain watcher, returning the
//! record immediately so the caller can poll.
//!
//! ## Guarantees
//!
//! | Guarantee | Enforcement Location |
//! |-----------|---------------------|
//! | Replay with a known token returns the original record | `service.rs` - `enqueue()` via `InsertOutcome::Replayed` |
//! | A busy key rejects new tokens with `KeyBusy` | store `insert_pending()` |
//! | Persisted as Pending before `enqueue` returns | `service.rs` - `enqueue()` |
//! | Cancellation only while Pending | `service.rs` - `cancel()` (CAS on Pending) |
//! | FIFO hand-off to workers | `domain/ready.rs` |
//!
//! ## Lifecycle
//!
//! ```text
//! enqueue ──→ [Pending] ──next_ready()──→ watcher
//!                 │  ↑                        │
//!                 │  └──── requeue(delay) ────┘ (retryable failure)
//!                 └── cancel ──→ [Failed(Cancelled)]
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{QueueConfig, QueueError};
pub use ports::SubmissionApi;
pub use service::SubmissionQueue;

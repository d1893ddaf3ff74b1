//! # BeanBlock Node Runtime
//!
//! Wires the write-coordination subsystems into one process.
//!
//! ## Modular Structure
//!
//! - `container/` - Configuration and the subsystem container
//! - `runtime` - Background tasks, the HTTP API and graceful shutdown
//!
//! ## Write Flow
//!
//! ```text
//! HTTP (6) ──enqueue──→ Submission Queue (2) ──→ Fingerprint Store (1)
//!                              │
//!                         next_ready
//!                              ↓
//!                     Chain Watcher (3) ──submit/receipts──→ Chain (5)
//!                              │
//!                    SubmissionConfirmed
//!                              ↓
//!                   Read-Repair Cache (4) invalidates the slot
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod container;
pub mod runtime;

pub use container::{ConfigError, ContainerError, NodeConfig, SubsystemContainer};
pub use runtime::NodeRuntime;

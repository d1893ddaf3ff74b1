//! # Read-Repair Cache Subsystem
//!
//! **Subsystem ID:** 4
//!
//! ## Purpose
//!
//! Serves document and emission reads from memory, falling back to the
//! contract. Every contract read is pinned to the *confirmed height* of its
//! key, so a value written by a Pending or not-yet-deep Submitted record is
//! never observed, and a cached value is dropped as soon as a newer write
//! for its key is Confirmed.
//!
//! ## Guarantees
//!
//! | Guarantee | Enforcement Location |
//! |-----------|---------------------|
//! | No entry served while a newer Confirmed record exists for its key | `service.rs` - `is_fresh()` |
//! | Reads never see unconfirmed writes | `service.rs` - `read_height()` |
//! | `confirmed_at_block` per key never decreases | `service.rs` - `remember()` |
//! | Not-found results are never cached | `service.rs` - `get()` |
//! | Bounded size, oldest fetch evicted first | `service.rs` - `evict_oldest()` |
//!
//! ## Read Path
//!
//! ```text
//! get(key) ──→ entry fresh? ──yes──→ hit
//!                   │ no
//!                   ↓
//!   height = max(head - depth + 1, latest confirmed block, cached block)
//!                   │
//!                   ↓
//!   contract read at height ──→ remember(key, value, height) ──→ miss
//!
//! SubmissionConfirmed (bus) ──→ invalidate(key) ──→ CacheInvalidated (bus)
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{CacheConfig, CacheError, CachedRecord, CachedValue, ProductStatus};
pub use ports::{CacheStats, ReadApi};
pub use service::ReadRepairCache;

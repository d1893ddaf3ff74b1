//! # Fingerprint Store Subsystem
//!
//! **Subsystem ID:** 1
//!
//! ## Purpose
//!
//! Maps every accepted write to its last known submission state. The queue,
//! the watcher workers and the read cache all coordinate through it; its
//! compare-and-swap is what keeps two workers from processing the same record.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | One Pending/Submitted record per logical key | `domain/index.rs` - `insert_pending()`, `put()` |
//! | One record per idempotency token | `domain/index.rs` - `by_token` index |
//! | One Pending/Submitted record per signer nonce | `domain/index.rs` - `check_nonce()` |
//! | Evicted tokens still replay | `domain/index.rs` - `tombstones` |
//! | Only legal status transitions | `domain/index.rs` - `compare_and_swap()` |
//! | Confirmed block per key never decreases | `domain/index.rs` - `index()` |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! adapters/memory.rs   - InMemoryFingerprintStore (RwLock<RecordIndex>)
//! adapters/snapshot.rs - SnapshotFile (atomic on-disk snapshot)
//! ports/inbound.rs     - FingerprintStore trait
//! domain/index.rs      - RecordIndex, InsertOutcome, StoreSnapshot
//! domain/errors.rs     - StoreError
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::{InMemoryFingerprintStore, SnapshotFile, StoreConfig};
pub use domain::{InsertOutcome, StoreError, StoreSnapshot};
pub use ports::{FingerprintStore, StoreStats};

//! Adapters for the Fingerprint Store.

pub mod memory;
pub mod snapshot;

pub use memory::{InMemoryFingerprintStore, StoreConfig};
pub use snapshot::SnapshotFile;

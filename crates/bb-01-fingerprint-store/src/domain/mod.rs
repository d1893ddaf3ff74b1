//! Domain layer for the Fingerprint Store.

pub mod errors;
pub mod index;

pub use errors::StoreError;
pub use index::{InsertOutcome, RecordIndex, StoreSnapshot, Tombstone};

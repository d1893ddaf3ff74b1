//! Ports (Hexagonal Architecture) for the Fingerprint Store.

pub mod inbound;

pub use inbound::{FingerprintStore, StoreStats};

//! Pinning service adapters.

pub mod memory;
pub mod pinata;

pub mod inbound;

pub use inbound::{CacheStats, ReadApi};

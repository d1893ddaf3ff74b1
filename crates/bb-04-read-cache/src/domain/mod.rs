mod config;
mod entry;
mod errors;

pub use config::CacheConfig;
pub use entry::{CachedRecord, CachedValue, ProductStatus};
pub use errors::CacheError;

//! Inbound (Driving) port: cached reads for the API gateway.

use crate::domain::{CacheError, CachedRecord, ProductStatus};
use async_trait::async_trait;
use serde::Serialize;
use shared_types::{LogicalKey, ProductId};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub evictions: u64,
}

#[async_trait]
pub trait ReadApi: Send + Sync {
    /// The slot's value at its confirmed height.
    ///
    /// # Errors
    /// - `NotFound`: nothing confirmed for the slot yet
    /// - `Chain`: the read failed; nothing is cached
    async fn get(&self, key: &LogicalKey) -> Result<CachedRecord, CacheError>;

    async fn is_product_complete(&self, product: ProductId) -> Result<ProductStatus, CacheError>;

    /// Drops the entry for `key`. Returns whether one was cached.
    fn invalidate(&self, key: &LogicalKey) -> bool;

    fn stats(&self) -> CacheStats;
}

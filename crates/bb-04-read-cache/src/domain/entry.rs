use serde::{Deserialize, Serialize};
use shared_types::{DocumentRecord, EmissionRecord, LogicalKey, ProductId, Timestamp};

/// A slot's on-chain value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachedValue {
    Document(DocumentRecord),
    CarbonEmission(EmissionRecord),
}

/// A value read at `confirmed_at_block`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRecord {
    pub key: LogicalKey,
    pub value: CachedValue,
    pub confirmed_at_block: u64,
    pub fetched_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStatus {
    pub product_id: ProductId,
    pub is_complete: bool,
    pub at_block: u64,
}

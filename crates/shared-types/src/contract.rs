//! # TradeDocuments Contract Port
//!
//! The fixed call interface of the external TradeDocuments contract, plus the
//! chain queries the watcher needs (head, nonces, receipts).
//!
//! ```text
//! storeDocument(uint256 productId, uint8 docType, string cid)
//! getDocument(uint256 productId, uint8 docType) → (string cid, address uploadedBy, uint256 timestamp)
//! setCarbonEmission(uint256 productId, uint256 totalEmissions, string unit)
//! getCarbonEmission(uint256 productId) → (uint256 totalEmissions, string unit, address reportedBy, uint256 timestamp)
//! isProductComplete(uint256 productId) → bool
//! ```
//!
//! One client is constructed at startup and shared as
//! `Arc<dyn TradeDocumentsContract>`.

use crate::entities::{
    Address, Cid, DocType, LogicalKey, ProductId, RecordType, TxHash, WritePayload,
};
use crate::errors::{ErrorKind, ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Block at which a read is evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadAt {
    Latest,
    Block(u64),
}

impl fmt::Display for ReadAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Block(n) => write!(f, "{n}"),
        }
    }
}

/// Result of `getDocument`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub cid: String,
    pub uploaded_by: Address,
    pub timestamp: u64,
}

/// Result of `getCarbonEmission`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionRecord {
    pub total_emissions: u64,
    pub unit: String,
    pub reported_by: Address,
    pub timestamp: u64,
}

/// Mined transaction outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
    pub revert_reason: Option<String>,
}

/// A state-changing contract call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractCall {
    StoreDocument {
        product: ProductId,
        doc_type: DocType,
        cid: Cid,
    },
    SetCarbonEmission {
        product: ProductId,
        total_emissions: u64,
        unit: String,
    },
}

impl ContractCall {
    /// The call that writes `payload` into the slot named by `key`.
    pub fn for_write(key: &LogicalKey, payload: &WritePayload) -> Result<Self, ValidationError> {
        match (key.record_type, payload) {
            (RecordType::Document(doc_type), WritePayload::Document { cid }) => {
                Ok(Self::StoreDocument {
                    product: key.entity_id,
                    doc_type,
                    cid: cid.clone(),
                })
            }
            (
                RecordType::CarbonEmission,
                WritePayload::CarbonEmission {
                    total_emissions,
                    unit,
                },
            ) => Ok(Self::SetCarbonEmission {
                product: key.entity_id,
                total_emissions: *total_emissions,
                unit: unit.clone(),
            }),
            (record, payload) => Err(ValidationError::PayloadMismatch {
                record: record.to_string(),
                payload: payload.kind_name().to_string(),
            }),
        }
    }

    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::StoreDocument { .. } => "storeDocument",
            Self::SetCarbonEmission { .. } => "setCarbonEmission",
        }
    }
}

/// Chain-side failures, classified for retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Network or RPC hiccup, including request timeouts.
    #[error("transient RPC error: {0}")]
    Transient(String),

    /// The nonce was already used or is ahead of the account.
    #[error("nonce conflict: {0}")]
    NonceConflict(String),

    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The contract has no value for the requested slot.
    #[error("{0}")]
    NotFound(String),

    /// The RPC endpoint cannot be reached.
    #[error("RPC endpoint unavailable: {0}")]
    Unavailable(String),

    /// The deployed contract does not expose the expected interface.
    #[error("contract interface mismatch: {0}")]
    InterfaceMismatch(String),

    /// Malformed response from the node.
    #[error("malformed chain response: {0}")]
    Decode(String),
}

impl ChainError {
    /// Whether broadcasting again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::NonceConflict(_) | Self::Unavailable(_)
        )
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) | Self::NonceConflict(_) => ErrorKind::TransientChainError,
            Self::Reverted(_) | Self::InsufficientFunds(_) => ErrorKind::Reverted,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::InterfaceMismatch(_) | Self::Decode(_) => ErrorKind::Internal,
        }
    }
}

/// Port to the TradeDocuments contract and its chain.
#[async_trait]
pub trait TradeDocumentsContract: Send + Sync {
    /// Fails unless the configured address hosts the expected interface.
    async fn verify_interface(&self) -> Result<(), ChainError>;

    /// Account that signs every write.
    fn signer(&self) -> Address;

    /// Current chain head.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Next nonce for the signer, counting transactions still in the pool.
    async fn pending_nonce(&self) -> Result<u64, ChainError>;

    /// Next nonce for the signer, counting only mined transactions.
    async fn latest_nonce(&self) -> Result<u64, ChainError>;

    async fn store_document(
        &self,
        product: ProductId,
        doc_type: DocType,
        cid: &Cid,
        nonce: u64,
    ) -> Result<TxHash, ChainError>;

    async fn set_carbon_emission(
        &self,
        product: ProductId,
        total_emissions: u64,
        unit: &str,
        nonce: u64,
    ) -> Result<TxHash, ChainError>;

    /// `Ok(None)` while the transaction is not mined (or unknown).
    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>, ChainError>;

    async fn get_document(
        &self,
        product: ProductId,
        doc_type: DocType,
        at: ReadAt,
    ) -> Result<DocumentRecord, ChainError>;

    async fn get_carbon_emission(
        &self,
        product: ProductId,
        at: ReadAt,
    ) -> Result<EmissionRecord, ChainError>;

    async fn is_product_complete(&self, product: ProductId, at: ReadAt) -> Result<bool, ChainError>;

    /// Broadcasts `call` with an explicit nonce.
    async fn submit(&self, call: &ContractCall, nonce: u64) -> Result<TxHash, ChainError> {
        match call {
            ContractCall::StoreDocument {
                product,
                doc_type,
                cid,
            } => self.store_document(*product, *doc_type, cid, nonce).await,
            ContractCall::SetCarbonEmission {
                product,
                total_emissions,
                unit,
            } => {
                self.set_carbon_emission(*product, *total_emissions, unit, nonce)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ChainError::Transient("timeout".into()).is_retryable());
        assert!(ChainError::NonceConflict("nonce too low".into()).is_retryable());
        assert!(ChainError::Unavailable("refused".into()).is_retryable());
        assert!(!ChainError::Reverted("Invalid docType".into()).is_retryable());
        assert!(!ChainError::InsufficientFunds("gas".into()).is_retryable());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ChainError::Reverted("x".into()).kind(), ErrorKind::Reverted);
        assert_eq!(
            ChainError::Unavailable("x".into()).kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(
            ChainError::NotFound("Document not found".into()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_call_for_write() {
        let product = ProductId::new(3).unwrap();
        let call = ContractCall::for_write(
            &LogicalKey::carbon_emission(product),
            &WritePayload::CarbonEmission {
                total_emissions: 1500,
                unit: "kgCO2e".into(),
            },
        )
        .unwrap();
        assert_eq!(call.method(), "setCarbonEmission");

        let mismatch = ContractCall::for_write(
            &LogicalKey::document(product, DocType::RetailReceipt),
            &WritePayload::CarbonEmission {
                total_emissions: 1,
                unit: "kgCO2e".into(),
            },
        );
        assert!(mismatch.is_err());
    }
}

//! Fingerprint store error types.

use shared_types::{ErrorKind, IdempotencyToken, LogicalKey, RequestId, SubmissionStatus};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("submission {0} not found")]
    NotFound(RequestId),

    /// Compare-and-swap lost: the record moved on since it was read.
    #[error(
        "submission {request_id} changed concurrently: expected {expected_status}@{expected_revision}, found {actual_status}@{actual_revision}"
    )]
    Conflict {
        request_id: RequestId,
        expected_status: SubmissionStatus,
        expected_revision: u64,
        actual_status: SubmissionStatus,
        actual_revision: u64,
    },

    #[error("submission {request_id}: transition {from} -> {to} is not allowed")]
    InvalidTransition {
        request_id: RequestId,
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    /// Request id, key, token and payload are fixed at acceptance.
    #[error("submission {0}: identity fields cannot change")]
    IdentityChanged(RequestId),

    #[error("key {key} already has active submission {holder}")]
    KeyOccupied { key: LogicalKey, holder: RequestId },

    #[error("idempotency token {token} already belongs to submission {holder}")]
    TokenTaken {
        token: IdempotencyToken,
        holder: RequestId,
    },

    #[error("nonce {nonce} is already held by submission {holder}")]
    NonceInUse { nonce: u64, holder: RequestId },

    #[error("submission {0} is still active and cannot be archived")]
    StillActive(RequestId),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl StoreError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::KeyOccupied { .. } => ErrorKind::KeyBusy,
            _ => ErrorKind::Internal,
        }
    }
}

//! Submission queue error types.

use bb_01_fingerprint_store::StoreError;
use shared_types::{ErrorKind, LogicalKey, RequestId, SubmissionStatus, ValidationError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Malformed CID, out-of-range emission, reused token.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("key {key} is busy with request {in_flight}")]
    KeyBusy {
        key: LogicalKey,
        in_flight: RequestId,
    },

    #[error("request {0} not found")]
    NotFound(RequestId),

    #[error("request {request_id} is {status} and can no longer be cancelled")]
    NotCancellable {
        request_id: RequestId,
        status: SubmissionStatus,
    },

    #[error("submission queue is full ({depth} waiting)")]
    QueueFull { depth: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
            Self::KeyBusy { .. } => ErrorKind::KeyBusy,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotCancellable { .. } => ErrorKind::NotCancellable,
            Self::QueueFull { .. } => ErrorKind::UpstreamUnavailable,
            Self::Store(e) => e.kind(),
        }
    }
}

impl From<ValidationError> for QueueError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidPayload(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ProductId;

    #[test]
    fn test_kinds() {
        let key = LogicalKey::carbon_emission(ProductId::new(1).unwrap());
        assert_eq!(
            QueueError::KeyBusy {
                key,
                in_flight: RequestId::new()
            }
            .kind(),
            ErrorKind::KeyBusy
        );
        assert_eq!(
            QueueError::from(ValidationError::InvalidProductId).kind(),
            ErrorKind::InvalidPayload
        );
        assert_eq!(
            QueueError::QueueFull { depth: 3 }.kind(),
            ErrorKind::UpstreamUnavailable
        );
    }
}

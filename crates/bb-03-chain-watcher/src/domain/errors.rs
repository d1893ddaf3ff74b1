use bb_01_fingerprint_store::StoreError;
use shared_types::{ChainError, ErrorKind, RequestId, SubmissionStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("request not found: {0}")]
    NotFound(RequestId),

    #[error("request {request_id} is {status} and has nothing to reconcile")]
    NotReconcilable {
        request_id: RequestId,
        status: SubmissionStatus,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("invalid watcher configuration: {0}")]
    InvalidConfig(String),
}

impl WatcherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotReconcilable { .. } => ErrorKind::InvalidPayload,
            Self::Store(e) => e.kind(),
            Self::Chain(e) => e.kind(),
            Self::InvalidConfig(_) => ErrorKind::Internal,
        }
    }
}

use shared_types::{ChainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The contract has no value for the slot at the confirmed height.
    #[error("{0}")]
    NotFound(String),

    #[error("chain error: {0}")]
    Chain(ChainError),

    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

impl From<ChainError> for CacheError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::NotFound(message) => Self::NotFound(message),
            other => Self::Chain(other),
        }
    }
}

impl CacheError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Chain(e) => e.kind(),
            Self::InvalidConfig(_) => ErrorKind::Internal,
        }
    }
}

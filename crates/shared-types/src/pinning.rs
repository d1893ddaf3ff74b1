//! Content-addressed storage port.
//!
//! Document files are pinned before their CID is written on chain. The
//! coordinator never interprets pinned content; it only needs the CID back.

use crate::entities::Cid;
use crate::errors::ErrorKind;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinningError {
    #[error("pinning service unavailable: {0}")]
    Unavailable(String),

    #[error("content not found: {0}")]
    NotFound(String),

    /// The service answered with a non-success status.
    #[error("pinning service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("pinning credentials not configured")]
    NotConfigured,

    #[error("invalid pinning response: {0}")]
    InvalidResponse(String),
}

impl PinningError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Rejected { status, .. } if *status >= 400 && *status < 500 => {
                ErrorKind::InvalidPayload
            }
            Self::InvalidResponse(_) => ErrorKind::Internal,
            _ => ErrorKind::UpstreamUnavailable,
        }
    }
}

#[async_trait]
pub trait PinningService: Send + Sync {
    /// Pins raw file bytes and returns their CID.
    async fn pin_file(&self, content: Vec<u8>, file_name: &str) -> Result<Cid, PinningError>;

    /// Pins a JSON document and returns its CID.
    async fn pin_json(
        &self,
        value: &serde_json::Value,
        name: Option<&str>,
    ) -> Result<Cid, PinningError>;

    /// Retrieves pinned content.
    async fn fetch(&self, cid: &Cid) -> Result<Vec<u8>, PinningError>;

    /// Pins content that already exists on the network.
    async fn pin(&self, cid: &Cid) -> Result<(), PinningError>;

    async fn unpin(&self, cid: &Cid) -> Result<(), PinningError>;

    /// Public gateway URL for `cid`.
    fn gateway_url(&self, cid: &Cid) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            PinningError::Unavailable("dns".into()).kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(
            PinningError::Rejected {
                status: 400,
                message: "bad".into()
            }
            .kind(),
            ErrorKind::InvalidPayload
        );
        assert_eq!(
            PinningError::Rejected {
                status: 502,
                message: "bad gateway".into()
            }
            .kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(PinningError::NotConfigured.kind(), ErrorKind::UpstreamUnavailable);
    }
}

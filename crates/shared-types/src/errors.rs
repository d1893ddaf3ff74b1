//! # Error Types
//!
//! The error taxonomy shared by every subsystem. Each subsystem keeps its own
//! `thiserror` enum and maps it onto an [`ErrorKind`], which is the stable,
//! machine-readable name surfaced to API callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error classification.
///
/// The serialized names never change; clients branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed CID, out-of-range emission value, bad key. Not retried.
    InvalidPayload,
    /// Another write for the same logical key is in flight.
    KeyBusy,
    /// Network or RPC hiccup. Retried with backoff up to a bound.
    TransientChainError,
    /// The contract rejected the call. Fatal for the request.
    Reverted,
    /// No confirmation within the configured wait. The transaction may still land.
    ConfirmationTimeout,
    /// Pinning service or RPC endpoint unreachable.
    UpstreamUnavailable,
    /// Unknown request id, or the contract has no value for the slot.
    NotFound,
    /// Cancellation requested after broadcast.
    NotCancellable,
    /// Request withdrawn by the caller before broadcast.
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPayload => "invalid_payload",
            Self::KeyBusy => "key_busy",
            Self::TransientChainError => "transient_chain_error",
            Self::Reverted => "reverted",
            Self::ConfirmationTimeout => "confirmation_timeout",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::NotFound => "not_found",
            Self::NotCancellable => "not_cancellable",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error as recorded on a submission record and returned by the polling API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RecordedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Validation failures raised by the constructors in [`crate::entities`].
///
/// All of them classify as [`ErrorKind::InvalidPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("productId must be a positive integer")]
    InvalidProductId,

    #[error("docType must be between 0 and 3, got {0}")]
    InvalidDocType(u64),

    #[error("invalid CID format: {0}")]
    InvalidCid(String),

    #[error("invalid idempotency token: {0}")]
    InvalidToken(String),

    #[error("invalid emission: {0}")]
    InvalidEmission(String),

    #[error("payload of type {payload} does not match record type {record}")]
    PayloadMismatch { record: String, payload: String },

    #[error("invalid hex value: {0}")]
    InvalidHex(String),
}

impl ValidationError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidPayload
    }
}

//! API errors and their HTTP mapping.
//!
//! Every failure that leaves the gateway is an `ApiError`: an `ErrorKind`
//! plus a message. The HTTP status depends on the kind alone.

use super::envelope::ApiResponse;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bb_02_submission_queue::QueueError;
use bb_03_chain_watcher::WatcherError;
use bb_04_read_cache::CacheError;
use shared_types::{ChainError, ErrorKind, PinningError, ValidationError};
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPayload, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::InvalidPayload => StatusCode::BAD_REQUEST,
            ErrorKind::KeyBusy | ErrorKind::NotCancellable | ErrorKind::Cancelled => {
                StatusCode::CONFLICT
            }
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::TransientChainError => StatusCode::BAD_GATEWAY,
            ErrorKind::Reverted => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::ConfirmationTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = %self.kind, message = %self.message, "Request failed");
        } else {
            warn!(kind = %self.kind, message = %self.message, "Request rejected");
        }
        ApiResponse::failure(status, self.kind, self.message).into_response()
    }
}

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

// Conversions from subsystem errors

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<WatcherError> for ApiError {
    fn from(e: WatcherError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<ChainError> for ApiError {
    fn from(e: ChainError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<PinningError> for ApiError {
    fn from(e: PinningError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

// Extractor rejections surface in the envelope like any other bad input

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::invalid_payload(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::invalid_payload(e.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        Self::invalid_payload(e.body_text())
    }
}

//! # Inbound Port - SubmissionApi
//!
//! What the HTTP layer may do with writes: submit them, poll them and
//! withdraw them while they are still Pending.

use crate::domain::QueueError;
use async_trait::async_trait;
use shared_types::{RequestId, SubmissionRecord, WriteRequest};

#[async_trait]
pub trait SubmissionApi: Send + Sync {
    /// Accepts a write and returns its record.
    ///
    /// # Errors
    /// - `InvalidPayload`: validation failed, or the token was used for a different write
    /// - `KeyBusy`: another write for the same key is Pending or Submitted
    /// - `QueueFull`: back-pressure, retry later
    ///
    /// Replaying a token returns the original record unchanged.
    async fn enqueue(&self, request: WriteRequest) -> Result<SubmissionRecord, QueueError>;

    /// Current state of a request, including archived ones.
    fn status(&self, request_id: &RequestId) -> Result<SubmissionRecord, QueueError>;

    /// Withdraws a Pending request.
    ///
    /// # Errors
    /// - `NotFound`: unknown request id
    /// - `NotCancellable`: the request was already broadcast or finished
    async fn cancel(&self, request_id: &RequestId) -> Result<SubmissionRecord, QueueError>;

    /// Requests waiting for a worker.
    fn depth(&self) -> usize;
}

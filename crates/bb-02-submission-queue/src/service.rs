//! # Submission Queue Service
//!
//! Accepts writes into the fingerprint store and hands their ids to the
//! chain watcher's workers.

use crate::domain::ready::NextReady;
use crate::domain::{validate_request, QueueConfig, QueueError, ReadyQueue};
use crate::ports::SubmissionApi;
use async_trait::async_trait;
use bb_01_fingerprint_store::{FingerprintStore, InsertOutcome, StoreError};
use parking_lot::Mutex;
use shared_bus::{EventPublisher, LedgerEvent};
use shared_types::{
    ErrorKind, FailureCause, RecordedError, RequestId, SubmissionRecord, SubmissionStatus,
    TimeSource, WriteRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Attempts at a cancel CAS before giving up on a record that keeps moving.
const CANCEL_CAS_ATTEMPTS: usize = 3;

pub struct SubmissionQueue {
    store: Arc<dyn FingerprintStore>,
    publisher: Arc<dyn EventPublisher>,
    time: Arc<dyn TimeSource>,
    config: QueueConfig,
    ready: Mutex<ReadyQueue>,
    notify: Notify,
}

impl SubmissionQueue {
    pub fn new(
        store: Arc<dyn FingerprintStore>,
        publisher: Arc<dyn EventPublisher>,
        time: Arc<dyn TimeSource>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            time,
            config,
            ready: Mutex::new(ReadyQueue::new()),
            notify: Notify::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn FingerprintStore> {
        &self.store
    }

    /// Waits for the next ready request id.
    pub async fn next_ready(&self) -> RequestId {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = self.ready.lock().pop_ready(self.time.now());
            match next {
                NextReady::Ready(id) => return id,
                NextReady::WaitUntil(at) => {
                    let wait = Duration::from_millis(at.saturating_sub(self.time.now()).max(1));
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                NextReady::Empty => notified.await,
            }
        }
    }

    /// Takes the next ready id without waiting.
    pub fn try_next_ready(&self) -> Option<RequestId> {
        match self.ready.lock().pop_ready(self.time.now()) {
            NextReady::Ready(id) => Some(id),
            _ => None,
        }
    }

    /// Queues `id` again after `delay`.
    pub fn requeue(&self, id: RequestId, delay: Duration) {
        let not_before = self.time.now() + delay.as_millis() as u64;
        if self.ready.lock().push(id, not_before) {
            debug!(request_id = %id, delay_ms = delay.as_millis() as u64, "Request requeued");
            self.notify.notify_one();
        }
    }

    fn push_ready(&self, id: RequestId) {
        if self.ready.lock().push(id, 0) {
            self.notify.notify_one();
        }
    }

    /// Queues every Pending record in the store. Used after a restart.
    pub fn requeue_pending(&self) -> usize {
        let pending = self.store.records_with_status(SubmissionStatus::Pending);
        let count = pending.len();
        for record in pending {
            self.push_ready(record.request_id);
        }
        count
    }

    fn cancelled(&self, record: &SubmissionRecord) -> SubmissionRecord {
        let mut next = record.clone();
        next.status = SubmissionStatus::Failed;
        next.failure = Some(FailureCause::Cancelled);
        next.last_error = Some(RecordedError::new(
            ErrorKind::Cancelled,
            "cancelled by caller before broadcast",
        ));
        next.updated_at = self.time.now();
        next
    }
}

#[async_trait]
impl SubmissionApi for SubmissionQueue {
    async fn enqueue(&self, request: WriteRequest) -> Result<SubmissionRecord, QueueError> {
        validate_request(&request, &self.config)?;

        let depth = self.depth();
        if depth >= self.config.max_queue_depth
            && self.store.get_by_token(request.idempotency_token()).is_none()
        {
            warn!(depth, "Submission queue full");
            return Err(QueueError::QueueFull { depth });
        }

        let record = SubmissionRecord::pending(RequestId::new(), &request, self.time.now());
        match self.store.insert_pending(record)? {
            InsertOutcome::Inserted(record) => {
                self.push_ready(record.request_id);
                info!(
                    request_id = %record.request_id,
                    key = %record.key,
                    token = %record.idempotency_token,
                    "Write accepted"
                );
                self.publisher
                    .publish(LedgerEvent::SubmissionAccepted {
                        request_id: record.request_id,
                        key: record.key,
                    })
                    .await;
                Ok(record)
            }
            InsertOutcome::Replayed(existing) => {
                debug!(
                    request_id = %existing.request_id,
                    token = %existing.idempotency_token,
                    "Idempotent replay"
                );
                Ok(existing)
            }
            InsertOutcome::TokenConflict(existing) => Err(QueueError::InvalidPayload(format!(
                "idempotency token {} was already used for a different write (request {})",
                existing.idempotency_token, existing.request_id
            ))),
            InsertOutcome::KeyBusy { in_flight } => {
                debug!(key = %request.key(), in_flight = %in_flight, "Key busy");
                Err(QueueError::KeyBusy {
                    key: *request.key(),
                    in_flight,
                })
            }
        }
    }

    fn status(&self, request_id: &RequestId) -> Result<SubmissionRecord, QueueError> {
        self.store
            .get(request_id)
            .ok_or(QueueError::NotFound(*request_id))
    }

    async fn cancel(&self, request_id: &RequestId) -> Result<SubmissionRecord, QueueError> {
        for _ in 0..CANCEL_CAS_ATTEMPTS {
            let record = self.status(request_id)?;
            match (record.status, &record.failure) {
                // A Pending record still holding a nonce was sent once with an
                // unknown outcome and may already be on the node.
                (SubmissionStatus::Pending, _) if record.nonce.is_none() => {}
                (SubmissionStatus::Failed, Some(FailureCause::Cancelled)) => return Ok(record),
                (status, _) => {
                    return Err(QueueError::NotCancellable {
                        request_id: *request_id,
                        status,
                    })
                }
            }

            let next = self.cancelled(&record);
            match self
                .store
                .compare_and_swap(SubmissionStatus::Pending, record.revision, next)
            {
                Ok(stored) => {
                    self.ready.lock().remove(request_id);
                    if let Err(e) = self.store.archive(request_id) {
                        warn!(request_id = %request_id, error = %e, "Failed to archive cancelled request");
                    }
                    info!(request_id = %request_id, key = %stored.key, "Write cancelled");
                    self.publisher
                        .publish(LedgerEvent::SubmissionCancelled {
                            request_id: stored.request_id,
                            key: stored.key,
                        })
                        .await;
                    return Ok(stored);
                }
                // A worker picked it up in between; look again.
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let record = self.status(request_id)?;
        Err(QueueError::NotCancellable {
            request_id: *request_id,
            status: record.status,
        })
    }

    fn depth(&self) -> usize {
        self.ready.lock().len()
    }
}

//! # Chain Watcher Service
//!
//! Drives each Pending record through broadcast and confirmation. All state
//! changes go through compare-and-swap on the fingerprint store, so a record
//! is only ever advanced by the worker that won it.

use crate::domain::{
    CycleOutcome, ReconcileOutcome, RecoveryReport, RetryDecision, RetryPolicy, TrackOutcome,
    WatcherConfig, WatcherError,
};
use crate::nonce::NonceManager;
use crate::ports::{WatcherApi, WatcherStats};
use async_trait::async_trait;
use bb_01_fingerprint_store::{FingerprintStore, StoreError};
use bb_02_submission_queue::SubmissionQueue;
use shared_bus::{subsystem, EventPublisher, LedgerEvent};
use shared_types::{
    ChainError, ContractCall, ErrorKind, FailureCause, ReadAt, RecordType, RecordedError,
    RequestId, SubmissionRecord, SubmissionStatus, TimeSource, TradeDocumentsContract,
    WritePayload,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Allocation attempts before a held nonce is treated as a conflict.
const MAX_NONCE_SKIPS: usize = 3;

/// The nonce a broadcast attempt went out with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SendNonce {
    /// Nothing was sent.
    Unsent,
    /// First send with a newly allocated nonce.
    Fresh(u64),
    /// Resend with the nonce of an earlier send whose outcome is unknown.
    Reserved(u64),
}

impl SendNonce {
    fn value(self) -> Option<u64> {
        match self {
            Self::Unsent => None,
            Self::Fresh(nonce) | Self::Reserved(nonce) => Some(nonce),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    broadcasts: AtomicU64,
    retries: AtomicU64,
    confirmed: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    reconciled: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct ChainWatcher {
    store: Arc<dyn FingerprintStore>,
    queue: Arc<SubmissionQueue>,
    contract: Arc<dyn TradeDocumentsContract>,
    publisher: Arc<dyn EventPublisher>,
    time: Arc<dyn TimeSource>,
    nonces: NonceManager,
    config: WatcherConfig,
    retry: RetryPolicy,
    counters: Counters,
}

impl ChainWatcher {
    pub fn new(
        queue: Arc<SubmissionQueue>,
        contract: Arc<dyn TradeDocumentsContract>,
        publisher: Arc<dyn EventPublisher>,
        time: Arc<dyn TimeSource>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            store: Arc::clone(queue.store()),
            nonces: NonceManager::new(Arc::clone(&contract)),
            retry: RetryPolicy::from_config(&config),
            queue,
            contract,
            publisher,
            time,
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    // =========================================================================
    // BROADCAST
    // =========================================================================

    /// Runs one broadcast cycle for a ready record.
    pub async fn process(&self, id: &RequestId) -> Result<CycleOutcome, WatcherError> {
        let record = self.load(id)?;
        if record.status != SubmissionStatus::Pending {
            debug!(request_id = %id, status = %record.status, "Skipping record that is no longer pending");
            return Ok(CycleOutcome::Skipped);
        }

        let call = match ContractCall::for_write(&record.key, &record.payload) {
            Ok(call) => call,
            Err(e) => {
                let cause = FailureCause::Reverted {
                    reason: e.to_string(),
                };
                self.fail(&record, cause.clone(), RecordedError::new(e.kind(), e.to_string()))
                    .await?;
                return Ok(CycleOutcome::Failed(cause));
            }
        };

        // A record that kept its nonce resends with it, never with a new one.
        let (send, nonce) = match record.nonce {
            Some(reserved) => (SendNonce::Reserved(reserved), reserved),
            None => match self.allocate_nonce().await {
                Ok(nonce) => (SendNonce::Fresh(nonce), nonce),
                Err(e) => {
                    // Allocation only fails on RPC trouble, which is always worth retrying.
                    let e = if e.is_retryable() {
                        e
                    } else {
                        ChainError::Transient(e.to_string())
                    };
                    return self.on_broadcast_error(&record, SendNonce::Unsent, e).await;
                }
            },
        };

        let now = self.time.now();
        let mut claimed = record.clone();
        claimed.status = SubmissionStatus::Submitted;
        claimed.nonce = Some(nonce);
        claimed.tx_hash = None;
        claimed.broadcast_at = Some(now);
        claimed.updated_at = now;

        let submitted =
            match self
                .store
                .compare_and_swap(SubmissionStatus::Pending, record.revision, claimed)
            {
                Ok(submitted) => submitted,
                Err(StoreError::Conflict { .. }) => {
                    debug!(request_id = %id, "Lost claim on record");
                    if let SendNonce::Fresh(nonce) = send {
                        self.nonces.release(nonce).await;
                    }
                    return Ok(CycleOutcome::Skipped);
                }
                Err(StoreError::NonceInUse { nonce, holder }) => {
                    let e = ChainError::NonceConflict(format!("nonce {nonce} is held by {holder}"));
                    return self.on_broadcast_error(&record, SendNonce::Unsent, e).await;
                }
                Err(e) => {
                    if let SendNonce::Fresh(nonce) = send {
                        self.nonces.release(nonce).await;
                    }
                    return Err(e.into());
                }
            };

        match self.rpc(self.contract.submit(&call, nonce)).await {
            Ok(tx_hash) => {
                let mut next = submitted.clone();
                next.tx_hash = Some(tx_hash);
                next.updated_at = self.time.now();
                let stored =
                    self.store
                        .compare_and_swap(SubmissionStatus::Submitted, submitted.revision, next)?;

                Counters::bump(&self.counters.broadcasts);
                info!(
                    request_id = %stored.request_id,
                    key = %stored.key,
                    method = call.method(),
                    nonce,
                    tx_hash = %tx_hash,
                    "Transaction broadcast"
                );
                self.publisher
                    .publish(LedgerEvent::TransactionBroadcast {
                        request_id: stored.request_id,
                        key: stored.key,
                        tx_hash,
                        nonce,
                    })
                    .await;
                Ok(CycleOutcome::Broadcast { tx_hash, nonce })
            }
            Err(e) => self.on_broadcast_error(&submitted, send, e).await,
        }
    }

    /// Moves a record off a failed broadcast.
    ///
    /// Retryable errors send it back to Pending with backoff. A send that may
    /// have reached the node (a timeout, or any failure of a resend) keeps
    /// its nonce, so the retry can only ever replace that transaction. When a
    /// resend finds the nonce taken, or the retries run out while the first
    /// send is unaccounted for, the record fails as timed out and
    /// reconciliation decides whether it landed.
    async fn on_broadcast_error(
        &self,
        record: &SubmissionRecord,
        send: SendNonce,
        error: ChainError,
    ) -> Result<CycleOutcome, WatcherError> {
        let recorded = RecordedError::new(error.kind(), error.to_string());
        let outcome_unknown = match send {
            SendNonce::Reserved(_) => true,
            SendNonce::Fresh(_) => matches!(error, ChainError::Transient(_)),
            SendNonce::Unsent => false,
        };
        let resend_refused = matches!(send, SendNonce::Reserved(_))
            && (!error.is_retryable() || matches!(error, ChainError::NonceConflict(_)));

        if resend_refused {
            return self.fail_unknown(record, &error).await;
        }

        let outcome = if error.is_retryable() {
            match self.retry.decide(record.attempt) {
                RetryDecision::Retry { attempt, delay } => {
                    let mut next = record.clone();
                    next.status = SubmissionStatus::Pending;
                    next.attempt = attempt;
                    next.nonce = if outcome_unknown { send.value() } else { None };
                    next.tx_hash = None;
                    next.broadcast_at = None;
                    next.last_error = Some(recorded.clone());
                    next.updated_at = self.time.now();
                    let stored = self
                        .store
                        .compare_and_swap(record.status, record.revision, next)?;

                    self.queue.requeue(stored.request_id, delay);
                    Counters::bump(&self.counters.retries);
                    warn!(
                        request_id = %stored.request_id,
                        attempt,
                        nonce = ?stored.nonce,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %error,
                        "Broadcast failed; retrying"
                    );
                    self.publisher
                        .publish(LedgerEvent::SubmissionRetrying {
                            request_id: stored.request_id,
                            key: stored.key,
                            attempt,
                            error: recorded,
                            retry_in_ms: delay.as_millis() as u64,
                        })
                        .await;
                    CycleOutcome::Retrying { attempt, delay }
                }
                RetryDecision::GiveUp if outcome_unknown => {
                    return self.fail_unknown(record, &error).await;
                }
                RetryDecision::GiveUp => {
                    self.fail(record, FailureCause::RetriesExhausted, recorded)
                        .await?;
                    CycleOutcome::Failed(FailureCause::RetriesExhausted)
                }
            }
        } else {
            let cause = match &error {
                ChainError::InsufficientFunds(_) => FailureCause::InsufficientFunds,
                ChainError::Reverted(reason) => FailureCause::Reverted {
                    reason: reason.clone(),
                },
                other => FailureCause::Reverted {
                    reason: other.to_string(),
                },
            };
            self.fail(record, cause.clone(), recorded).await?;
            CycleOutcome::Failed(cause)
        };

        match (&error, send) {
            // Still reserved by the record.
            (_, SendNonce::Fresh(_)) if outcome_unknown => {}
            (
                ChainError::Unavailable(_) | ChainError::Reverted(_) | ChainError::InsufficientFunds(_),
                SendNonce::Fresh(nonce),
            ) => self.nonces.release(nonce).await,
            (_, SendNonce::Fresh(_)) | (ChainError::NonceConflict(_), SendNonce::Unsent) => {
                self.resync_nonces().await
            }
            _ => {}
        }

        Ok(outcome)
    }

    /// Fails a record whose transaction may or may not be on the node. It
    /// keeps its nonce so reconciliation can tell whether it landed.
    async fn fail_unknown(
        &self,
        record: &SubmissionRecord,
        error: &ChainError,
    ) -> Result<CycleOutcome, WatcherError> {
        let message = format!("broadcast outcome unknown: {error}");
        self.fail(
            record,
            FailureCause::ConfirmationTimeout,
            RecordedError::new(ErrorKind::ConfirmationTimeout, message),
        )
        .await?;
        self.resync_nonces().await;
        Ok(CycleOutcome::Failed(FailureCause::ConfirmationTimeout))
    }

    // =========================================================================
    // CONFIRMATION
    // =========================================================================

    /// Polls the receipt of a broadcast record until it is confirmed, fails
    /// or runs out of time.
    pub async fn track(&self, id: &RequestId) -> Result<TrackOutcome, WatcherError> {
        let timeout_ms = self.config.confirmation_timeout.as_millis() as u64;
        loop {
            let record = self.load(id)?;
            let (SubmissionStatus::Submitted, Some(tx_hash), Some(broadcast_at)) =
                (record.status, record.tx_hash, record.broadcast_at)
            else {
                return Ok(TrackOutcome::Abandoned);
            };

            match self.rpc(self.contract.transaction_receipt(&tx_hash)).await {
                Ok(Some(receipt)) if !receipt.success => {
                    let reason = receipt
                        .revert_reason
                        .unwrap_or_else(|| "execution reverted".to_string());
                    let cause = FailureCause::Reverted {
                        reason: reason.clone(),
                    };
                    self.fail(&record, cause.clone(), RecordedError::new(ErrorKind::Reverted, reason))
                        .await?;
                    return Ok(TrackOutcome::Failed(cause));
                }
                Ok(Some(receipt)) => match self.rpc(self.contract.block_number()).await {
                    Ok(head) if self.is_deep_enough(head, receipt.block_number) => {
                        self.confirm(&record, receipt.block_number).await?;
                        return Ok(TrackOutcome::Confirmed {
                            block: receipt.block_number,
                        });
                    }
                    Ok(head) => trace!(
                        request_id = %id,
                        head,
                        included = receipt.block_number,
                        "Waiting for confirmation depth"
                    ),
                    Err(e) => debug!(request_id = %id, error = %e, "Head lookup failed"),
                },
                Ok(None) => trace!(request_id = %id, "No receipt yet"),
                Err(e) => debug!(request_id = %id, error = %e, "Receipt lookup failed"),
            }

            if self.time.now() >= broadcast_at.saturating_add(timeout_ms) {
                let message = format!(
                    "no confirmation within {}s of broadcast; the transaction may still land",
                    self.config.confirmation_timeout.as_secs()
                );
                self.fail(
                    &record,
                    FailureCause::ConfirmationTimeout,
                    RecordedError::new(ErrorKind::ConfirmationTimeout, message),
                )
                .await?;
                // A dropped transaction leaves a gap the node will not fill.
                self.resync_nonces().await;
                return Ok(TrackOutcome::Failed(FailureCause::ConfirmationTimeout));
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn is_deep_enough(&self, head: u64, included: u64) -> bool {
        head >= included && head - included + 1 >= self.config.confirmation_depth
    }

    async fn confirm(
        &self,
        record: &SubmissionRecord,
        block: u64,
    ) -> Result<SubmissionRecord, WatcherError> {
        let mut next = record.clone();
        next.status = SubmissionStatus::Confirmed;
        next.confirmed_at_block = Some(block);
        next.failure = None;
        next.updated_at = self.time.now();
        let stored = self
            .store
            .compare_and_swap(record.status, record.revision, next)?;

        Counters::bump(&self.counters.confirmed);
        info!(
            request_id = %stored.request_id,
            key = %stored.key,
            block,
            "Write confirmed"
        );
        self.publisher
            .publish(LedgerEvent::SubmissionConfirmed {
                request_id: stored.request_id,
                key: stored.key,
                tx_hash: stored.tx_hash,
                block_number: block,
            })
            .await;
        self.archive(&stored.request_id);
        Ok(stored)
    }

    async fn fail(
        &self,
        record: &SubmissionRecord,
        cause: FailureCause,
        error: RecordedError,
    ) -> Result<SubmissionRecord, WatcherError> {
        let mut next = record.clone();
        next.status = SubmissionStatus::Failed;
        next.failure = Some(cause.clone());
        next.last_error = Some(error.clone());
        next.updated_at = self.time.now();
        let stored = self
            .store
            .compare_and_swap(record.status, record.revision, next)?;

        if cause == FailureCause::ConfirmationTimeout {
            Counters::bump(&self.counters.timeouts);
        } else {
            Counters::bump(&self.counters.failed);
            self.archive(&stored.request_id);
        }
        warn!(
            request_id = %stored.request_id,
            key = %stored.key,
            cause = ?cause,
            error = %error.message,
            "Write failed"
        );
        self.publisher
            .publish(LedgerEvent::SubmissionFailed {
                request_id: stored.request_id,
                key: stored.key,
                error,
            })
            .await;
        Ok(stored)
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    async fn reconcile_record(
        &self,
        record: &SubmissionRecord,
    ) -> Result<ReconcileOutcome, WatcherError> {
        let head = self.rpc(self.contract.block_number()).await?;

        if let Some(tx_hash) = record.tx_hash {
            match self.rpc(self.contract.transaction_receipt(&tx_hash)).await? {
                Some(receipt) if !receipt.success => {
                    let reason = receipt
                        .revert_reason
                        .unwrap_or_else(|| "execution reverted".to_string());
                    self.fail(
                        record,
                        FailureCause::Reverted {
                            reason: reason.clone(),
                        },
                        RecordedError::new(ErrorKind::Reverted, reason.clone()),
                    )
                    .await?;
                    return Ok(ReconcileOutcome::Reverted { reason });
                }
                Some(receipt) if self.is_deep_enough(head, receipt.block_number) => {
                    self.confirm(record, receipt.block_number).await?;
                    return Ok(ReconcileOutcome::Landed {
                        block: receipt.block_number,
                    });
                }
                Some(_) => return Ok(ReconcileOutcome::Unknown),
                None => {}
            }
        }

        let Some(nonce) = record.nonce else {
            self.mark_dropped(record).await?;
            return Ok(ReconcileOutcome::NotLanded);
        };
        let latest = self.rpc(self.contract.latest_nonce()).await?;
        if latest <= nonce {
            return Ok(ReconcileOutcome::Unknown);
        }

        // The nonce is spent. Without a hash the only evidence left is the
        // slot itself.
        if record.tx_hash.is_none() {
            let safe = head.saturating_sub(self.config.confirmation_depth.saturating_sub(1));
            if self.slot_holds(record, ReadAt::Block(safe)).await? {
                self.confirm(record, safe).await?;
                return Ok(ReconcileOutcome::Landed { block: safe });
            }
            if self.slot_holds(record, ReadAt::Latest).await? {
                return Ok(ReconcileOutcome::Unknown);
            }
        }

        self.mark_dropped(record).await?;
        Ok(ReconcileOutcome::NotLanded)
    }

    /// Whether the slot currently holds this record's payload, written by us.
    async fn slot_holds(&self, record: &SubmissionRecord, at: ReadAt) -> Result<bool, ChainError> {
        let signer = self.contract.signer();
        let product = record.key.entity_id;
        let found = match (&record.key.record_type, &record.payload) {
            (RecordType::Document(doc_type), WritePayload::Document { cid }) => self
                .rpc(self.contract.get_document(product, *doc_type, at))
                .await
                .map(|doc| doc.cid == cid.as_str() && doc.uploaded_by == signer),
            (
                RecordType::CarbonEmission,
                WritePayload::CarbonEmission {
                    total_emissions,
                    unit,
                },
            ) => self
                .rpc(self.contract.get_carbon_emission(product, at))
                .await
                .map(|emission| {
                    emission.total_emissions == *total_emissions
                        && emission.unit == *unit
                        && emission.reported_by == signer
                }),
            _ => Ok(false),
        };
        match found {
            Err(ChainError::NotFound(_)) => Ok(false),
            other => other,
        }
    }

    async fn mark_dropped(&self, record: &SubmissionRecord) -> Result<(), WatcherError> {
        let mut next = record.clone();
        next.failure = Some(FailureCause::Dropped);
        next.last_error = Some(RecordedError::new(
            ErrorKind::TransientChainError,
            "transaction never landed; resubmit with a new idempotency token",
        ));
        next.updated_at = self.time.now();
        let stored = self
            .store
            .compare_and_swap(record.status, record.revision, next)?;
        info!(request_id = %stored.request_id, key = %stored.key, "Timed-out write never landed");
        self.archive(&stored.request_id);
        Ok(())
    }

    /// Reconciles every timed-out record once.
    pub async fn reconcile_all(&self) -> Vec<(RequestId, ReconcileOutcome)> {
        let mut settled = Vec::new();
        for record in self.store.records_with_status(SubmissionStatus::Failed) {
            if !record.awaits_reconciliation() {
                continue;
            }
            match self.reconcile_record(&record).await {
                Ok(outcome) => settled.push((record.request_id, outcome)),
                Err(e) => debug!(request_id = %record.request_id, error = %e, "Reconciliation deferred"),
            }
        }
        settled
    }

    // =========================================================================
    // RECOVERY & BACKGROUND TASKS
    // =========================================================================

    /// Resumes work left behind by a previous process.
    ///
    /// Pending records are queued again, Submitted records with a hash get
    /// a confirmation tracker, and Submitted records without one (crash
    /// mid-broadcast) are failed as timed out so reconciliation can settle
    /// them.
    pub async fn recover(self: &Arc<Self>) -> Result<RecoveryReport, WatcherError> {
        let mut report = RecoveryReport {
            requeued: self.queue.requeue_pending(),
            ..RecoveryReport::default()
        };

        for record in self.store.records_with_status(SubmissionStatus::Submitted) {
            if record.tx_hash.is_some() {
                report.resumed.push(record.request_id);
                self.spawn_tracker(record.request_id);
            } else {
                self.fail(
                    &record,
                    FailureCause::ConfirmationTimeout,
                    RecordedError::new(
                        ErrorKind::ConfirmationTimeout,
                        "broadcast outcome unknown after restart",
                    ),
                )
                .await?;
                report.orphaned.push(record.request_id);
            }
        }

        info!(
            requeued = report.requeued,
            resumed = report.resumed.len(),
            orphaned = report.orphaned.len(),
            "Chain watcher recovered"
        );
        Ok(report)
    }

    pub fn spawn_tracker(self: &Arc<Self>, id: RequestId) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            match watcher.track(&id).await {
                Ok(outcome) => debug!(request_id = %id, outcome = ?outcome, "Tracking finished"),
                Err(e) => {
                    error!(request_id = %id, error = %e, "Confirmation tracking failed");
                    watcher
                        .critical(format!("tracking {id} failed: {e}"))
                        .await;
                }
            }
        })
    }

    async fn handle_ready(self: &Arc<Self>, id: RequestId) {
        match self.process(&id).await {
            Ok(CycleOutcome::Broadcast { .. }) => {
                self.spawn_tracker(id);
            }
            Ok(outcome) => trace!(request_id = %id, outcome = ?outcome, "Cycle finished"),
            Err(e) => {
                error!(request_id = %id, error = %e, "Broadcast cycle failed");
                if self
                    .store
                    .get(&id)
                    .is_some_and(|r| r.status == SubmissionStatus::Pending)
                {
                    self.queue.requeue(id, self.config.backoff_max);
                }
                self.critical(format!("broadcast cycle for {id} failed: {e}"))
                    .await;
            }
        }
    }

    /// Starts `config.workers` workers pulling from the submission queue.
    pub fn spawn_workers(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.config.workers)
            .map(|worker| {
                let watcher = Arc::clone(self);
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    debug!(worker, "Watcher worker started");
                    while !*shutdown.borrow() {
                        let id = tokio::select! {
                            _ = shutdown.changed() => break,
                            id = watcher.queue.next_ready() => id,
                        };
                        watcher.handle_ready(id).await;
                    }
                    debug!(worker, "Watcher worker stopped");
                })
            })
            .collect()
    }

    /// Periodically reconciles timed-out records.
    pub fn spawn_reconciler(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(watcher.config.reconcile_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        for (id, outcome) in watcher.reconcile_all().await {
                            if outcome != ReconcileOutcome::Unknown {
                                Counters::bump(&watcher.counters.reconciled);
                            }
                            debug!(request_id = %id, outcome = ?outcome, "Reconciled");
                        }
                    }
                }
            }
        })
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn load(&self, id: &RequestId) -> Result<SubmissionRecord, WatcherError> {
        self.store.get(id).ok_or(WatcherError::NotFound(*id))
    }

    fn archive(&self, id: &RequestId) {
        if let Err(e) = self.store.archive(id) {
            warn!(request_id = %id, error = %e, "Failed to archive record");
        }
    }

    async fn rpc<T>(&self, call: impl Future<Output = Result<T, ChainError>>) -> Result<T, ChainError> {
        match tokio::time::timeout(self.config.rpc_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Transient(format!(
                "RPC call exceeded {}ms",
                self.config.rpc_timeout.as_millis()
            ))),
        }
    }

    /// First nonce above every nonce held by an active record.
    fn nonce_floor(&self) -> u64 {
        [SubmissionStatus::Pending, SubmissionStatus::Submitted]
            .into_iter()
            .flat_map(|status| self.store.records_with_status(status))
            .filter_map(|r| r.nonce)
            .max()
            .map_or(0, |n| n + 1)
    }

    async fn resync_nonces(&self) {
        let floor = self.nonce_floor();
        if let Err(e) = self.rpc(self.nonces.resync(floor)).await {
            warn!(error = %e, "Nonce resync failed");
        }
    }

    /// Allocates a nonce that no active record is holding.
    async fn allocate_nonce(&self) -> Result<u64, ChainError> {
        for _ in 0..MAX_NONCE_SKIPS {
            let nonce = self.rpc(self.nonces.allocate()).await?;
            match self.store.nonce_holder(nonce) {
                None => return Ok(nonce),
                Some(holder) => {
                    warn!(nonce, holder = %holder, "Allocated nonce is already held; resyncing");
                    self.resync_nonces().await;
                }
            }
        }
        Err(ChainError::NonceConflict(
            "no free nonce after resynchronising".into(),
        ))
    }

    async fn critical(&self, message: String) {
        self.publisher
            .publish(LedgerEvent::CriticalError {
                subsystem_id: subsystem::CHAIN_WATCHER,
                message,
            })
            .await;
    }
}

#[async_trait]
impl WatcherApi for ChainWatcher {
    async fn reconcile(&self, request_id: &RequestId) -> Result<ReconcileOutcome, WatcherError> {
        let record = self.load(request_id)?;
        if !record.awaits_reconciliation() {
            return Err(WatcherError::NotReconcilable {
                request_id: *request_id,
                status: record.status,
            });
        }
        let outcome = self.reconcile_record(&record).await?;
        if outcome != ReconcileOutcome::Unknown {
            Counters::bump(&self.counters.reconciled);
        }
        Ok(outcome)
    }

    fn stats(&self) -> WatcherStats {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        WatcherStats {
            broadcasts: read(&self.counters.broadcasts),
            retries: read(&self.counters.retries),
            confirmed: read(&self.counters.confirmed),
            failed: read(&self.counters.failed),
            timeouts: read(&self.counters.timeouts),
            reconciled: read(&self.counters.reconciled),
        }
    }
}

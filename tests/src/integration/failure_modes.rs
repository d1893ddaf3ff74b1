//! # Failure Modes
//!
//! Non-retryable rejections, confirmation timeouts, cancellation and
//! restart recovery.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bb_01_fingerprint_store::{FingerprintStore, InMemoryFingerprintStore, StoreConfig};
    use bb_02_submission_queue::{QueueError, SubmissionApi};
    use bb_03_chain_watcher::{CycleOutcome, ReconcileOutcome, WatcherApi, WatcherConfig};
    use shared_bus::{EventFilter, EventTopic, LedgerEvent};
    use shared_types::{ChainError, DocType, ErrorKind, FailureCause, SubmissionStatus};

    use crate::integration::harness::{cid, document, emission, Ledger, TEST_WAIT};

    const BLOCK_INTERVAL: Duration = Duration::from_millis(20);

    fn short_timeout() -> WatcherConfig {
        WatcherConfig {
            confirmation_timeout: Duration::from_millis(200),
            ..WatcherConfig::for_testing()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_revert_fails_in_one_cycle_without_retry() {
        let ledger = Ledger::running(WatcherConfig::for_testing(), BLOCK_INTERVAL);
        let mut failures = ledger
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::Watcher]));
        ledger.chain.revert_next_send("Invalid docType");

        let accepted = ledger
            .queue
            .enqueue(document(1, DocType::RetailReceipt, cid('r'), "revert-1"))
            .await
            .unwrap();
        let record = ledger.wait_terminal(&accepted.request_id).await;

        assert_eq!(record.status, SubmissionStatus::Failed);
        assert_eq!(record.attempt, 0);
        assert_eq!(
            record.failure,
            Some(FailureCause::Reverted {
                reason: "Invalid docType".into()
            })
        );
        assert_eq!(
            record.last_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::Reverted)
        );
        assert_eq!(ledger.chain.send_count(), 1);

        loop {
            let event = tokio::time::timeout(TEST_WAIT, failures.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(!matches!(event, LedgerEvent::SubmissionRetrying { .. }));
            if matches!(event, LedgerEvent::SubmissionFailed { .. }) {
                break;
            }
        }

        // The slot is free again.
        let retry = ledger
            .queue
            .enqueue(document(1, DocType::RetailReceipt, cid('r'), "revert-2"))
            .await
            .unwrap();
        let retry = ledger.wait_terminal(&retry.request_id).await;
        assert_eq!(retry.status, SubmissionStatus::Confirmed);

        ledger.stop().await;
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_not_retried() {
        let ledger = Ledger::manual(WatcherConfig::for_testing());
        ledger.chain.fail_next_sends(
            1,
            ChainError::InsufficientFunds("balance 0 < gas * price".into()),
        );
        let accepted = ledger.queue.enqueue(emission(2, 50, "broke")).await.unwrap();
        assert_eq!(ledger.queue.try_next_ready(), Some(accepted.request_id));

        assert_eq!(
            ledger.watcher.process(&accepted.request_id).await.unwrap(),
            CycleOutcome::Failed(FailureCause::InsufficientFunds)
        );
        let record = ledger.record(&accepted.request_id);
        assert_eq!(record.attempt, 0);
        assert_eq!(record.last_error.map(|e| e.kind), Some(ErrorKind::Reverted));
        assert_eq!(ledger.queue.try_next_ready(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_missing_confirmation_times_out_not_reverts() {
        let ledger = Ledger::running(short_timeout(), BLOCK_INTERVAL);
        ledger.chain.drop_next_send();

        let accepted = ledger
            .queue
            .enqueue(emission(3, 1500, "never-lands"))
            .await
            .unwrap();
        let record = ledger.wait_terminal(&accepted.request_id).await;

        assert_eq!(record.status, SubmissionStatus::Failed);
        assert_eq!(record.failure, Some(FailureCause::ConfirmationTimeout));
        assert_eq!(
            record.last_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::ConfirmationTimeout)
        );
        assert!(record.tx_hash.is_some());
        assert!(record.awaits_reconciliation());

        // Nothing else consumed the nonce, so the outcome stays open.
        assert_eq!(
            ledger
                .watcher
                .reconcile(&accepted.request_id)
                .await
                .unwrap(),
            ReconcileOutcome::Unknown
        );
        assert_eq!(
            ledger.record(&accepted.request_id).failure,
            Some(FailureCause::ConfirmationTimeout)
        );

        ledger.stop().await;
    }

    #[tokio::test]
    async fn test_cancelled_request_is_never_broadcast() {
        let ledger = Ledger::manual(WatcherConfig::for_testing());
        let accepted = ledger.queue.enqueue(emission(4, 70, "cancel-me")).await.unwrap();

        let cancelled = ledger.queue.cancel(&accepted.request_id).await.unwrap();
        assert_eq!(cancelled.status, SubmissionStatus::Failed);
        assert_eq!(cancelled.failure, Some(FailureCause::Cancelled));

        if let Some(id) = ledger.queue.try_next_ready() {
            assert_eq!(
                ledger.watcher.process(&id).await.unwrap(),
                CycleOutcome::Skipped
            );
        }
        assert_eq!(ledger.chain.send_count(), 0);

        // Replaying the cancelled token returns the cancelled record.
        let replay = ledger.queue.enqueue(emission(4, 70, "cancel-me")).await.unwrap();
        assert_eq!(replay.request_id, accepted.request_id);
        assert_eq!(replay.status, SubmissionStatus::Failed);

        // A fresh token may write the slot.
        assert!(ledger.queue.enqueue(emission(4, 70, "cancel-me-2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_reuse_for_other_write_is_rejected() {
        let ledger = Ledger::manual(WatcherConfig::for_testing());
        ledger.queue.enqueue(emission(5, 10, "shared")).await.unwrap();

        let err = ledger
            .queue
            .enqueue(emission(6, 10, "shared"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidPayload(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);
        assert_eq!(ledger.store.stats().records, 1);
    }

    #[tokio::test]
    async fn test_restart_recovers_in_flight_work() {
        let before = Ledger::manual(WatcherConfig::for_testing());

        let broadcast = before.queue.enqueue(emission(7, 1, "in-flight")).await.unwrap();
        assert_eq!(before.queue.try_next_ready(), Some(broadcast.request_id));
        before.watcher.process(&broadcast.request_id).await.unwrap();
        let waiting = before.queue.enqueue(emission(8, 1, "waiting")).await.unwrap();

        let snapshot = before.store.snapshot();
        let after = Ledger::with_store(
            InMemoryFingerprintStore::from_snapshot(snapshot, StoreConfig::default()),
            short_timeout(),
        );
        assert_eq!(
            after.record(&broadcast.request_id).status,
            SubmissionStatus::Submitted
        );

        let report = after.watcher.recover().await.unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(report.resumed, vec![broadcast.request_id]);
        assert!(report.orphaned.is_empty());

        assert_eq!(after.queue.try_next_ready(), Some(waiting.request_id));
        assert!(matches!(
            after.watcher.process(&waiting.request_id).await.unwrap(),
            CycleOutcome::Broadcast { .. }
        ));

        // The replayed token still maps to the restored record.
        let replay = after.queue.enqueue(emission(7, 1, "in-flight")).await.unwrap();
        assert_eq!(replay.request_id, broadcast.request_id);
    }
}

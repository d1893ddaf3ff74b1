//! # Concurrency
//!
//! At most one active request per record slot, no matter how many callers
//! race, and replays of one token never fork a second record.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use bb_01_fingerprint_store::FingerprintStore;
    use bb_02_submission_queue::{QueueError, SubmissionApi};
    use bb_03_chain_watcher::WatcherConfig;
    use rand::Rng;
    use shared_types::{DocType, LogicalKey, RequestId, SubmissionStatus};
    use tokio::task::JoinSet;

    use crate::integration::harness::{cid, document, emission, product, Ledger, TEST_WAIT};

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_racing_tokens_admit_one_writer() {
        let ledger = Arc::new(Ledger::manual(WatcherConfig::for_testing()));
        let mut racers = JoinSet::new();
        for i in 0..32 {
            let ledger = Arc::clone(&ledger);
            racers.spawn(async move {
                ledger
                    .queue
                    .enqueue(emission(1, 100 + i, &format!("racer-{i}")))
                    .await
            });
        }

        let mut accepted = Vec::new();
        let mut busy = Vec::new();
        while let Some(result) = racers.join_next().await {
            match result.unwrap() {
                Ok(record) => accepted.push(record.request_id),
                Err(QueueError::KeyBusy { in_flight, .. }) => busy.push(in_flight),
                Err(other) => panic!("unexpected error {other}"),
            }
        }

        assert_eq!(accepted.len(), 1);
        assert_eq!(busy.len(), 31);
        assert!(busy.iter().all(|id| *id == accepted[0]));
        assert_eq!(ledger.store.stats().records, 1);
        assert_eq!(
            ledger
                .store
                .get_active(&LogicalKey::carbon_emission(product(1)))
                .map(|r| r.request_id),
            Some(accepted[0])
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_replays_share_one_record() {
        let ledger = Arc::new(Ledger::manual(WatcherConfig::for_testing()));
        let mut replays = JoinSet::new();
        for _ in 0..20 {
            let ledger = Arc::clone(&ledger);
            replays.spawn(async move {
                ledger
                    .queue
                    .enqueue(document(3, DocType::FarmCertificate, cid('f'), "same-token"))
                    .await
                    .unwrap()
                    .request_id
            });
        }

        let mut ids = HashSet::new();
        while let Some(id) = replays.join_next().await {
            ids.insert(id.unwrap());
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(ledger.store.stats().records, 1);
        assert_eq!(ledger.queue.depth(), 1);
    }

    #[tokio::test]
    async fn test_key_busy_until_terminal() {
        let ledger = Ledger::manual(WatcherConfig::for_testing());
        let first = ledger.queue.enqueue(emission(6, 10, "first")).await.unwrap();

        let err = ledger
            .queue
            .enqueue(emission(6, 20, "second"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::KeyBusy { in_flight, .. } if in_flight == first.request_id));

        // Still busy once broadcast.
        assert_eq!(ledger.queue.try_next_ready(), Some(first.request_id));
        ledger.watcher.process(&first.request_id).await.unwrap();
        assert_eq!(
            ledger.record(&first.request_id).status,
            SubmissionStatus::Submitted
        );
        assert!(matches!(
            ledger.queue.enqueue(emission(6, 20, "second")).await,
            Err(QueueError::KeyBusy { .. })
        ));

        ledger.chain.mine_block();
        ledger.watcher.track(&first.request_id).await.unwrap();

        let second = ledger.queue.enqueue(emission(6, 20, "second")).await.unwrap();
        assert_ne!(second.request_id, first.request_id);
        assert_eq!(second.status, SubmissionStatus::Pending);

        // A different slot was never blocked.
        assert!(ledger.queue.enqueue(emission(7, 20, "other")).await.is_ok());
    }

    /// Many writers take turns on one slot while the watcher and a block
    /// producer run. The chain must see their writes strictly one after
    /// another.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_single_writer_under_stress() {
        const WRITERS: u64 = 8;
        let ledger = Arc::new(Ledger::running(
            WatcherConfig::for_testing(),
            Duration::from_millis(5),
        ));
        let key = LogicalKey::carbon_emission(product(11));

        let mut writers = JoinSet::new();
        for writer in 0..WRITERS {
            let ledger = Arc::clone(&ledger);
            writers.spawn(async move {
                let deadline = tokio::time::Instant::now() + TEST_WAIT;
                loop {
                    match ledger
                        .queue
                        .enqueue(emission(11, 1000 + writer, &format!("writer-{writer}")))
                        .await
                    {
                        Ok(record) => return ledger.wait_terminal(&record.request_id).await,
                        Err(QueueError::KeyBusy { .. }) => {
                            assert!(tokio::time::Instant::now() < deadline, "writer starved");
                            let pause = rand::thread_rng().gen_range(1..5);
                            tokio::time::sleep(Duration::from_millis(pause)).await;
                        }
                        Err(other) => panic!("unexpected error {other}"),
                    }
                }
            });
        }

        let mut records = Vec::new();
        while let Some(record) = writers.join_next().await {
            records.push(record.unwrap());
        }
        assert_eq!(records.len() as u64, WRITERS);
        assert!(records
            .iter()
            .all(|r| r.status == SubmissionStatus::Confirmed));

        // Each write was accepted only after the previous one settled, and no
        // two writes landed in the same block.
        records.sort_by_key(|r| r.confirmed_at_block);
        for pair in records.windows(2) {
            assert!(pair[0].confirmed_at_block < pair[1].confirmed_at_block);
            assert!(pair[1].created_at >= pair[0].updated_at);
        }
        assert_eq!(
            ledger.store.latest_confirmed_block(&key),
            records.last().and_then(|r| r.confirmed_at_block)
        );
        assert_eq!(ledger.chain.send_count(), WRITERS);

        let distinct: HashSet<RequestId> = records.iter().map(|r| r.request_id).collect();
        assert_eq!(distinct.len() as u64, WRITERS);

        match Arc::try_unwrap(ledger) {
            Ok(ledger) => ledger.stop().await,
            Err(_) => panic!("ledger still shared"),
        }
    }
}

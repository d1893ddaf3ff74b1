//! # Write Flow
//!
//! Accept → broadcast → confirm → read, across queue, watcher, chain and
//! cache.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bb_01_fingerprint_store::FingerprintStore;
    use bb_02_submission_queue::SubmissionApi;
    use bb_03_chain_watcher::{CycleOutcome, TrackOutcome, WatcherConfig};
    use bb_04_read_cache::{CachedValue, ReadApi};
    use shared_bus::{EventFilter, LedgerEvent};
    use shared_types::{
        Cid, DocType, LogicalKey, ReadAt, RequestId, SubmissionStatus, TradeDocumentsContract,
    };

    use crate::integration::harness::{cid, document, emission, product, Ledger, TEST_WAIT};

    const BLOCK_INTERVAL: Duration = Duration::from_millis(20);

    /// Broadcasts `id` and mines until it is confirmed.
    async fn settle(ledger: &Ledger, id: &RequestId) -> u64 {
        assert_eq!(ledger.queue.try_next_ready(), Some(*id));
        assert!(matches!(
            ledger.watcher.process(id).await.unwrap(),
            CycleOutcome::Broadcast { .. }
        ));
        ledger.chain.mine_block();
        match ledger.watcher.track(id).await.unwrap() {
            TrackOutcome::Confirmed { block } => block,
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_document_reaches_confirmed_and_reads_back() {
        let ledger = Ledger::running(WatcherConfig::for_testing(), BLOCK_INTERVAL);
        let doc_cid = Cid::parse("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap();
        let doc_type = DocType::from_u64(0).unwrap();

        let accepted = ledger
            .queue
            .enqueue(document(1, doc_type, doc_cid.clone(), "doc-flow-1"))
            .await
            .unwrap();
        assert_eq!(accepted.status, SubmissionStatus::Pending);

        let record = ledger.wait_terminal(&accepted.request_id).await;
        assert_eq!(record.status, SubmissionStatus::Confirmed);
        let block = record.confirmed_at_block.unwrap();
        assert!(record.tx_hash.is_some());

        let cached = ledger
            .cache
            .get(&LogicalKey::document(product(1), doc_type))
            .await
            .unwrap();
        assert!(cached.confirmed_at_block >= block);
        let CachedValue::Document(stored) = cached.value else {
            panic!("expected a document");
        };
        assert_eq!(stored.cid, doc_cid.as_str());
        assert_eq!(stored.uploaded_by, ledger.chain.signer());

        let on_chain = ledger
            .chain
            .get_document(product(1), doc_type, ReadAt::Latest)
            .await
            .unwrap();
        assert_eq!(on_chain.cid, doc_cid.as_str());

        ledger.stop().await;
    }

    #[tokio::test]
    async fn test_emission_replay_broadcasts_once() {
        let ledger = Ledger::manual(WatcherConfig::for_testing());

        let first = ledger
            .queue
            .enqueue(emission(2, 1500, "emission-1500"))
            .await
            .unwrap();
        let second = ledger
            .queue
            .enqueue(emission(2, 1500, "emission-1500"))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(ledger.queue.depth(), 1);

        let block = settle(&ledger, &first.request_id).await;

        let replay = ledger
            .queue
            .enqueue(emission(2, 1500, "emission-1500"))
            .await
            .unwrap();
        assert_eq!(replay.request_id, first.request_id);
        assert_eq!(replay.status, SubmissionStatus::Confirmed);
        assert_eq!(replay.confirmed_at_block, Some(block));
        assert_eq!(ledger.chain.send_count(), 1);
        assert_eq!(ledger.queue.try_next_ready(), None);

        let cached = ledger
            .cache
            .get(&LogicalKey::carbon_emission(product(2)))
            .await
            .unwrap();
        let CachedValue::CarbonEmission(stored) = cached.value else {
            panic!("expected an emission");
        };
        assert_eq!(stored.total_emissions, 1500);
        assert_eq!(stored.unit, "kgCO2e");
    }

    #[tokio::test]
    async fn test_confirmed_block_is_monotonic_per_key() {
        let ledger = Ledger::manual(WatcherConfig::for_testing());
        let key = LogicalKey::carbon_emission(product(5));
        let mut blocks = Vec::new();

        for (round, total) in [1000_u64, 2000, 3000].into_iter().enumerate() {
            let record = ledger
                .queue
                .enqueue(emission(5, total, &format!("round-{round}")))
                .await
                .unwrap();
            blocks.push(settle(&ledger, &record.request_id).await);
            ledger.chain.mine_blocks(2);
            assert_eq!(ledger.store.latest_confirmed_block(&key), blocks.last().copied());
        }

        assert!(blocks.windows(2).all(|pair| pair[0] < pair[1]));

        let cached = ledger.cache.get(&key).await.unwrap();
        let CachedValue::CarbonEmission(stored) = cached.value else {
            panic!("expected an emission");
        };
        assert_eq!(stored.total_emissions, 3000);
    }

    #[tokio::test]
    async fn test_cached_read_follows_new_confirmation() {
        let ledger = Ledger::manual(WatcherConfig::for_testing());
        let key = LogicalKey::carbon_emission(product(9));

        let first = ledger.queue.enqueue(emission(9, 100, "v1")).await.unwrap();
        settle(&ledger, &first.request_id).await;
        let cached = ledger.cache.get(&key).await.unwrap();
        assert!(matches!(
            cached.value,
            CachedValue::CarbonEmission(ref e) if e.total_emissions == 100
        ));

        // No invalidation task here: the store's confirmed block alone
        // forces the repair.
        let second = ledger.queue.enqueue(emission(9, 200, "v2")).await.unwrap();
        let block = settle(&ledger, &second.request_id).await;
        let cached = ledger.cache.get(&key).await.unwrap();
        assert!(cached.confirmed_at_block >= block);
        assert!(matches!(
            cached.value,
            CachedValue::CarbonEmission(ref e) if e.total_emissions == 200
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_product_completes_after_all_documents() {
        let ledger = Ledger::running(WatcherConfig::for_testing(), BLOCK_INTERVAL);
        let mut events = ledger.bus.subscribe(EventFilter::all());

        for (i, doc_type) in DocType::ALL.iter().enumerate() {
            let status = ledger.cache.is_product_complete(product(4)).await.unwrap();
            assert!(!status.is_complete);

            let seed = ['a', 'b', 'c', 'd'][i];
            let record = ledger
                .queue
                .enqueue(document(4, *doc_type, cid(seed), &format!("complete-{i}")))
                .await
                .unwrap();
            let record = ledger.wait_terminal(&record.request_id).await;
            assert_eq!(record.status, SubmissionStatus::Confirmed);
        }

        let status = ledger.cache.is_product_complete(product(4)).await.unwrap();
        assert!(status.is_complete);

        let mut confirmed = 0;
        while confirmed < DocType::ALL.len() {
            let event = tokio::time::timeout(TEST_WAIT, events.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event, LedgerEvent::SubmissionConfirmed { .. }) {
                confirmed += 1;
            }
        }

        ledger.stop().await;
    }
}

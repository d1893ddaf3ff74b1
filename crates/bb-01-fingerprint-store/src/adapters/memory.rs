//! In-memory fingerprint store.
//!
//! A `RecordIndex` behind a `parking_lot::RwLock`. Every operation takes the
//! lock once, so each is atomic; none of them suspend.

use crate::domain::{InsertOutcome, RecordIndex, StoreError, StoreSnapshot};
use crate::ports::{FingerprintStore, StoreStats};
use parking_lot::RwLock;
use shared_types::{IdempotencyToken, LogicalKey, RequestId, SubmissionRecord, SubmissionStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Default number of terminal records kept for replay lookups.
pub const DEFAULT_ARCHIVE_CAPACITY: usize = 100_000;

#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Archived records kept before the oldest are dropped. A dropped
    /// record's idempotency token can be used again.
    pub archive_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            archive_capacity: DEFAULT_ARCHIVE_CAPACITY,
        }
    }
}

pub struct InMemoryFingerprintStore {
    index: RwLock<RecordIndex>,
    config: StoreConfig,
    cas_conflicts: AtomicU64,
}

impl InMemoryFingerprintStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            index: RwLock::new(RecordIndex::new(config.archive_capacity)),
            config,
            cas_conflicts: AtomicU64::new(0),
        }
    }

    /// Rebuilds a store from a snapshot, skipping records that would break
    /// an invariant.
    pub fn from_snapshot(snapshot: StoreSnapshot, config: StoreConfig) -> Self {
        let (index, rejected) = RecordIndex::restore(snapshot, config.archive_capacity);
        if !rejected.is_empty() {
            warn!(count = rejected.len(), "Skipped inconsistent records while restoring snapshot");
        }
        Self {
            index: RwLock::new(index),
            config,
            cas_conflicts: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.index.read().snapshot()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl Default for InMemoryFingerprintStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl FingerprintStore for InMemoryFingerprintStore {
    fn insert_pending(&self, record: SubmissionRecord) -> Result<InsertOutcome, StoreError> {
        let outcome = self.index.write().insert_pending(record);
        if let InsertOutcome::Inserted(record) = &outcome {
            debug!(request_id = %record.request_id, key = %record.key, "Stored pending submission");
        }
        Ok(outcome)
    }

    fn get(&self, id: &RequestId) -> Option<SubmissionRecord> {
        self.index.read().get(id).cloned()
    }

    fn get_by_token(&self, token: &IdempotencyToken) -> Option<SubmissionRecord> {
        self.index.read().lookup_token(token)
    }

    fn get_active(&self, key: &LogicalKey) -> Option<SubmissionRecord> {
        self.index.read().get_active(key).cloned()
    }

    fn get_by_key(&self, key: &LogicalKey) -> Option<SubmissionRecord> {
        self.index.read().get_by_key(key).cloned()
    }

    fn put(&self, record: SubmissionRecord) -> Result<(), StoreError> {
        self.index.write().put(record)
    }

    fn delete(&self, id: &RequestId) -> Option<SubmissionRecord> {
        self.index.write().delete(id)
    }

    fn compare_and_swap(
        &self,
        expected_status: SubmissionStatus,
        expected_revision: u64,
        next: SubmissionRecord,
    ) -> Result<SubmissionRecord, StoreError> {
        let result = self
            .index
            .write()
            .compare_and_swap(expected_status, expected_revision, next);
        match &result {
            Ok(stored) => debug!(
                request_id = %stored.request_id,
                from = %expected_status,
                to = %stored.status,
                revision = stored.revision,
                "Submission transitioned"
            ),
            Err(StoreError::Conflict { request_id, .. }) => {
                self.cas_conflicts.fetch_add(1, Ordering::Relaxed);
                debug!(request_id = %request_id, "Compare-and-swap lost");
            }
            Err(e) => warn!(error = %e, "Compare-and-swap rejected"),
        }
        result
    }

    fn archive(&self, id: &RequestId) -> Result<(), StoreError> {
        let evicted = self.index.write().archive(id)?;
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted archived submissions");
        }
        Ok(())
    }

    fn latest_confirmed_block(&self, key: &LogicalKey) -> Option<u64> {
        self.index.read().latest_confirmed_block(key)
    }

    fn nonce_holder(&self, nonce: u64) -> Option<RequestId> {
        self.index.read().nonce_holder(nonce)
    }

    fn records_with_status(&self, status: SubmissionStatus) -> Vec<SubmissionRecord> {
        let index = self.index.read();
        let mut records: Vec<SubmissionRecord> = index
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.request_id));
        records
    }

    fn stats(&self) -> StoreStats {
        let index = self.index.read();
        let mut stats = StoreStats {
            records: index.len(),
            archived: index.archived_len(),
            tombstones: index.tombstone_len(),
            cas_conflicts: self.cas_conflicts.load(Ordering::Relaxed),
            ..StoreStats::default()
        };
        for record in index.iter() {
            match record.status {
                SubmissionStatus::Pending => stats.pending += 1,
                SubmissionStatus::Submitted => stats.submitted += 1,
                SubmissionStatus::Confirmed => stats.confirmed += 1,
                SubmissionStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Cid, DocType, FailureCause, ProductId, WriteRequest};
    use std::sync::Arc;

    fn record(token: &str, product: u64) -> SubmissionRecord {
        let request = WriteRequest::store_document(
            ProductId::new(product).unwrap(),
            DocType::FarmCertificate,
            Cid::parse(format!("Qm{}", "Z".repeat(44))).unwrap(),
            IdempotencyToken::new(token).unwrap(),
            1,
        );
        SubmissionRecord::pending(RequestId::new(), &request, 1)
    }

    #[test]
    fn test_cas_conflicts_are_counted() {
        let store = InMemoryFingerprintStore::default();
        let r = record("t-1", 1);
        store.insert_pending(r.clone()).unwrap();

        let mut cancelled = r.clone();
        cancelled.status = SubmissionStatus::Failed;
        cancelled.failure = Some(FailureCause::Cancelled);
        store
            .compare_and_swap(SubmissionStatus::Pending, 0, cancelled.clone())
            .unwrap();
        assert!(store
            .compare_and_swap(SubmissionStatus::Pending, 0, cancelled)
            .is_err());
        assert_eq!(store.stats().cas_conflicts, 1);
        assert_eq!(store.stats().failed, 1);
    }

    #[test]
    fn test_delete_by_token() {
        let store = InMemoryFingerprintStore::default();
        let r = record("t-del", 1);
        store.insert_pending(r.clone()).unwrap();
        assert_eq!(
            store.delete_by_token(&r.idempotency_token).map(|d| d.request_id),
            Some(r.request_id)
        );
        assert!(store.get(&r.request_id).is_none());
    }

    #[test]
    fn test_records_with_status_sorted_by_age() {
        let store = InMemoryFingerprintStore::default();
        let mut older = record("t-old", 1);
        older.created_at = 1;
        let mut newer = record("t-new", 2);
        newer.created_at = 5;
        store.insert_pending(newer.clone()).unwrap();
        store.insert_pending(older.clone()).unwrap();

        let pending: Vec<_> = store
            .records_with_status(SubmissionStatus::Pending)
            .into_iter()
            .map(|r| r.request_id)
            .collect();
        assert_eq!(pending, vec![older.request_id, newer.request_id]);
    }

    #[test]
    fn test_concurrent_inserts_keep_one_active_per_key() {
        let store = Arc::new(InMemoryFingerprintStore::default());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.insert_pending(record(&format!("t-{i}"), 1)))
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .filter(|o| matches!(o, InsertOutcome::Inserted(_)))
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(store.stats().pending, 1);
    }

    proptest::proptest! {
        #[test]
        fn prop_inserts_never_fork_a_key_or_token(
            ops in proptest::collection::vec((1u64..4, 0usize..6), 1..40)
        ) {
            let store = InMemoryFingerprintStore::default();
            for (product, token) in ops {
                store.insert_pending(record(&format!("t-{token}"), product)).unwrap();
            }

            let pending = store.records_with_status(SubmissionStatus::Pending);
            let mut keys: Vec<_> = pending.iter().map(|r| r.key).collect();
            keys.sort();
            keys.dedup();
            proptest::prop_assert_eq!(keys.len(), pending.len());

            for record in &pending {
                proptest::prop_assert_eq!(
                    store.get_by_token(&record.idempotency_token).map(|r| r.request_id),
                    Some(record.request_id)
                );
            }
        }
    }
}

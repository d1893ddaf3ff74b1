//! Inbound (Driving) port: the store API used by the queue, the watcher and
//! the read cache.

use crate::domain::{InsertOutcome, StoreError};
use serde::Serialize;
use shared_types::{IdempotencyToken, LogicalKey, RequestId, SubmissionRecord, SubmissionStatus};

/// Counters describing the store's contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub records: usize,
    pub archived: usize,
    /// Evicted records whose tokens still replay.
    pub tombstones: usize,
    pub pending: usize,
    pub submitted: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub cas_conflicts: u64,
}

/// Keyed store of submission records.
///
/// Every method is atomic with respect to every other. Implementations must
/// never hold a lock across an `.await`; the trait is synchronous for that
/// reason.
pub trait FingerprintStore: Send + Sync {
    /// Stores a fresh Pending record unless its token or key is taken.
    fn insert_pending(&self, record: SubmissionRecord) -> Result<InsertOutcome, StoreError>;

    fn get(&self, id: &RequestId) -> Option<SubmissionRecord>;

    /// Also answers for archive-evicted records, rebuilt from their tombstone.
    fn get_by_token(&self, token: &IdempotencyToken) -> Option<SubmissionRecord>;

    /// The Pending or Submitted record holding `key`.
    fn get_active(&self, key: &LogicalKey) -> Option<SubmissionRecord>;

    /// The active record for `key`, or else the most recently accepted one.
    fn get_by_key(&self, key: &LogicalKey) -> Option<SubmissionRecord>;

    /// Unconditional upsert, subject to the key, token and nonce invariants.
    fn put(&self, record: SubmissionRecord) -> Result<(), StoreError>;

    fn delete(&self, id: &RequestId) -> Option<SubmissionRecord>;

    fn delete_by_token(&self, token: &IdempotencyToken) -> Option<SubmissionRecord> {
        let record = self.get_by_token(token)?;
        self.delete(&record.request_id)
    }

    /// Replaces the record if it is still at `expected_status` and
    /// `expected_revision`. Returns the stored record.
    fn compare_and_swap(
        &self,
        expected_status: SubmissionStatus,
        expected_revision: u64,
        next: SubmissionRecord,
    ) -> Result<SubmissionRecord, StoreError>;

    /// Marks a terminal record as archived.
    fn archive(&self, id: &RequestId) -> Result<(), StoreError>;

    /// Highest `confirmed_at_block` of any Confirmed record for `key`.
    fn latest_confirmed_block(&self, key: &LogicalKey) -> Option<u64>;

    /// The active record currently holding `nonce`.
    fn nonce_holder(&self, nonce: u64) -> Option<RequestId>;

    /// Records at `status`, oldest first.
    fn records_with_status(&self, status: SubmissionStatus) -> Vec<SubmissionRecord>;

    fn stats(&self) -> StoreStats;
}

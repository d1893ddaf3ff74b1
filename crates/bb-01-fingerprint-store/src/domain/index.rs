//! # Record Index
//!
//! The single-threaded core of the fingerprint store. Holds every submission
//! record plus the secondary indices that enforce the store's invariants:
//!
//! | Index | Invariant |
//! |-------|-----------|
//! | `by_token` | one record per idempotency token |
//! | `active_by_key` | at most one Pending/Submitted record per logical key |
//! | `nonce_holders` | at most one Pending/Submitted record per signer nonce |
//! | `confirmed_block` | highest confirmation block per key, never decreases |
//! | `tombstones` | tokens of archive-evicted records keep replaying |
//!
//! A Pending record only carries a nonce after a send whose outcome is
//! unknown; it keeps that nonce reserved until it is sent again.
//!
//! Locking is the caller's business; see `adapters::memory`.

use super::errors::StoreError;
use serde::{Deserialize, Serialize};
use shared_types::{
    FailureCause, IdempotencyToken, LogicalKey, RequestId, SubmissionRecord, SubmissionStatus,
    Timestamp, TxHash, WritePayload,
};
use std::collections::{HashMap, HashSet, VecDeque};

/// Outcome of an atomic insert of a fresh Pending record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was stored.
    Inserted(SubmissionRecord),
    /// The token was seen before for the same write; the original record.
    Replayed(SubmissionRecord),
    /// The token was seen before for a different write.
    TokenConflict(SubmissionRecord),
    /// Another write holds the key.
    KeyBusy { in_flight: RequestId },
}

/// What survives of a terminal record once the archive drops it: enough to
/// answer a replay of its token with the original outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub request_id: RequestId,
    pub idempotency_token: IdempotencyToken,
    pub key: LogicalKey,
    pub payload: WritePayload,
    pub status: SubmissionStatus,
    pub failure: Option<FailureCause>,
    pub tx_hash: Option<TxHash>,
    pub confirmed_at_block: Option<u64>,
    pub submitted_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Tombstone {
    fn of(record: &SubmissionRecord) -> Self {
        Self {
            request_id: record.request_id,
            idempotency_token: record.idempotency_token.clone(),
            key: record.key,
            payload: record.payload.clone(),
            status: record.status,
            failure: record.failure.clone(),
            tx_hash: record.tx_hash,
            confirmed_at_block: record.confirmed_at_block,
            submitted_at: record.submitted_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    /// The terminal record as a replay reports it. Retry history is gone.
    pub fn to_record(&self) -> SubmissionRecord {
        SubmissionRecord {
            request_id: self.request_id,
            key: self.key,
            idempotency_token: self.idempotency_token.clone(),
            payload: self.payload.clone(),
            tx_hash: self.tx_hash,
            nonce: None,
            status: self.status,
            attempt: 0,
            last_error: None,
            failure: self.failure.clone(),
            confirmed_at_block: self.confirmed_at_block,
            submitted_at: self.submitted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            broadcast_at: None,
            revision: 0,
        }
    }
}

/// Serializable image of the whole index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub records: Vec<SubmissionRecord>,
    /// Archived ids, oldest first.
    pub archived: Vec<RequestId>,
    #[serde(default)]
    pub tombstones: Vec<Tombstone>,
}

#[derive(Debug, Default)]
pub struct RecordIndex {
    records: HashMap<RequestId, SubmissionRecord>,
    by_token: HashMap<IdempotencyToken, RequestId>,
    active_by_key: HashMap<LogicalKey, RequestId>,
    latest_by_key: HashMap<LogicalKey, RequestId>,
    nonce_holders: HashMap<u64, RequestId>,
    confirmed_block: HashMap<LogicalKey, u64>,
    tombstones: HashMap<IdempotencyToken, Tombstone>,
    archive_order: VecDeque<RequestId>,
    archived: HashSet<RequestId>,
    archive_capacity: usize,
}

impl RecordIndex {
    pub fn new(archive_capacity: usize) -> Self {
        Self {
            archive_capacity,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn archived_len(&self) -> usize {
        self.archived.len()
    }

    pub fn tombstone_len(&self) -> usize {
        self.tombstones.len()
    }

    pub fn get(&self, id: &RequestId) -> Option<&SubmissionRecord> {
        self.records.get(id)
    }

    pub fn get_by_token(&self, token: &IdempotencyToken) -> Option<&SubmissionRecord> {
        self.by_token.get(token).and_then(|id| self.records.get(id))
    }

    /// The record for `token`, rebuilt from its tombstone if it was evicted.
    pub fn lookup_token(&self, token: &IdempotencyToken) -> Option<SubmissionRecord> {
        self.get_by_token(token)
            .cloned()
            .or_else(|| self.tombstones.get(token).map(Tombstone::to_record))
    }

    pub fn get_active(&self, key: &LogicalKey) -> Option<&SubmissionRecord> {
        self.active_by_key.get(key).and_then(|id| self.records.get(id))
    }

    /// The active record for `key`, or else the most recently accepted one.
    pub fn get_by_key(&self, key: &LogicalKey) -> Option<&SubmissionRecord> {
        self.get_active(key).or_else(|| {
            self.latest_by_key
                .get(key)
                .and_then(|id| self.records.get(id))
        })
    }

    pub fn latest_confirmed_block(&self, key: &LogicalKey) -> Option<u64> {
        self.confirmed_block.get(key).copied()
    }

    pub fn nonce_holder(&self, nonce: u64) -> Option<RequestId> {
        self.nonce_holders.get(&nonce).copied()
    }

    pub fn is_archived(&self, id: &RequestId) -> bool {
        self.archived.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubmissionRecord> {
        self.records.values()
    }

    /// Atomically decides replay / conflict / busy / insert for a new record.
    pub fn insert_pending(&mut self, record: SubmissionRecord) -> InsertOutcome {
        if let Some(existing) = self.lookup_token(&record.idempotency_token) {
            return if existing.key == record.key && existing.payload == record.payload {
                InsertOutcome::Replayed(existing)
            } else {
                InsertOutcome::TokenConflict(existing)
            };
        }
        if let Some(holder) = self.active_by_key.get(&record.key) {
            return InsertOutcome::KeyBusy { in_flight: *holder };
        }

        let mut record = record;
        record.status = SubmissionStatus::Pending;
        record.revision = 0;
        self.index(&record);
        self.records.insert(record.request_id, record.clone());
        InsertOutcome::Inserted(record)
    }

    /// Unconditional upsert. Still refuses to break the key, token and
    /// nonce invariants.
    pub fn put(&mut self, record: SubmissionRecord) -> Result<(), StoreError> {
        let token_holder = self
            .by_token
            .get(&record.idempotency_token)
            .copied()
            .or_else(|| {
                self.tombstones
                    .get(&record.idempotency_token)
                    .map(|t| t.request_id)
            });
        if let Some(holder) = token_holder {
            if holder != record.request_id {
                return Err(StoreError::TokenTaken {
                    token: record.idempotency_token.clone(),
                    holder,
                });
            }
        }
        if record.is_active() {
            if let Some(holder) = self.active_by_key.get(&record.key) {
                if *holder != record.request_id {
                    return Err(StoreError::KeyOccupied {
                        key: record.key,
                        holder: *holder,
                    });
                }
            }
        }
        self.check_nonce(&record)?;

        if let Some(previous) = self.records.remove(&record.request_id) {
            self.unindex(&previous);
        }
        self.index(&record);
        self.records.insert(record.request_id, record);
        Ok(())
    }

    /// Replaces a record if it is still at `expected_status`/`expected_revision`.
    ///
    /// On success the stored record carries `expected_revision + 1`.
    pub fn compare_and_swap(
        &mut self,
        expected_status: SubmissionStatus,
        expected_revision: u64,
        mut next: SubmissionRecord,
    ) -> Result<SubmissionRecord, StoreError> {
        let id = next.request_id;
        let current = self.records.get(&id).ok_or(StoreError::NotFound(id))?;

        if current.status != expected_status || current.revision != expected_revision {
            return Err(StoreError::Conflict {
                request_id: id,
                expected_status,
                expected_revision,
                actual_status: current.status,
                actual_revision: current.revision,
            });
        }
        if current.key != next.key
            || current.idempotency_token != next.idempotency_token
            || current.payload != next.payload
        {
            return Err(StoreError::IdentityChanged(id));
        }
        let late_landing_ok = current.status != SubmissionStatus::Failed
            || next.status != SubmissionStatus::Confirmed
            || current.failure == Some(FailureCause::ConfirmationTimeout);
        if !current.status.can_transition_to(next.status) || !late_landing_ok {
            return Err(StoreError::InvalidTransition {
                request_id: id,
                from: current.status,
                to: next.status,
            });
        }
        self.check_nonce(&next)?;

        next.revision = expected_revision + 1;
        if let Some(previous) = self.records.remove(&id) {
            self.unindex(&previous);
        }
        self.index(&next);
        self.records.insert(id, next.clone());
        Ok(next)
    }

    pub fn delete(&mut self, id: &RequestId) -> Option<SubmissionRecord> {
        let record = self.records.remove(id)?;
        self.unindex(&record);
        if self.archived.remove(id) {
            self.archive_order.retain(|archived| archived != id);
        }
        if self.latest_by_key.get(&record.key) == Some(id) {
            self.latest_by_key.remove(&record.key);
        }
        Some(record)
    }

    /// Marks a terminal record as archived.
    ///
    /// Archived records stay readable by id and token until the archive
    /// exceeds its capacity; the oldest are then dropped, leaving a tombstone
    /// so their tokens still replay. Returns the ids that were dropped.
    pub fn archive(&mut self, id: &RequestId) -> Result<Vec<RequestId>, StoreError> {
        let record = self.records.get(id).ok_or(StoreError::NotFound(*id))?;
        if record.is_active() {
            return Err(StoreError::StillActive(*id));
        }
        if !self.archived.insert(*id) {
            return Ok(Vec::new());
        }
        self.archive_order.push_back(*id);

        let mut evicted = Vec::new();
        while self.archive_order.len() > self.archive_capacity {
            let Some(oldest) = self.archive_order.pop_front() else {
                break;
            };
            self.archived.remove(&oldest);
            if let Some(record) = self.delete(&oldest) {
                self.tombstones
                    .insert(record.idempotency_token.clone(), Tombstone::of(&record));
                evicted.push(oldest);
            }
        }
        Ok(evicted)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let mut records: Vec<SubmissionRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| (r.created_at, r.request_id));
        let mut tombstones: Vec<Tombstone> = self.tombstones.values().cloned().collect();
        tombstones.sort_by_key(|t| (t.created_at, t.request_id));
        StoreSnapshot {
            records,
            archived: self.archive_order.iter().copied().collect(),
            tombstones,
        }
    }

    /// Rebuilds an index from a snapshot. Records that would violate an
    /// invariant are skipped and returned.
    pub fn restore(snapshot: StoreSnapshot, archive_capacity: usize) -> (Self, Vec<RequestId>) {
        let mut index = Self::new(archive_capacity);
        let mut rejected = Vec::new();
        for tombstone in snapshot.tombstones {
            index
                .tombstones
                .insert(tombstone.idempotency_token.clone(), tombstone);
        }
        for record in snapshot.records {
            let id = record.request_id;
            if index.put(record).is_err() {
                rejected.push(id);
            }
        }
        for id in snapshot.archived {
            if index.records.contains_key(&id) && index.archived.insert(id) {
                index.archive_order.push_back(id);
            }
        }
        (index, rejected)
    }

    fn check_nonce(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        if !record.is_active() {
            return Ok(());
        }
        if let Some(nonce) = record.nonce {
            if let Some(holder) = self.nonce_holders.get(&nonce) {
                if *holder != record.request_id {
                    return Err(StoreError::NonceInUse {
                        nonce,
                        holder: *holder,
                    });
                }
            }
        }
        Ok(())
    }

    fn index(&mut self, record: &SubmissionRecord) {
        let id = record.request_id;
        self.by_token.insert(record.idempotency_token.clone(), id);

        let newer = self
            .latest_by_key
            .get(&record.key)
            .and_then(|latest| self.records.get(latest))
            .map_or(true, |latest| latest.created_at <= record.created_at);
        if newer {
            self.latest_by_key.insert(record.key, id);
        }

        if record.is_active() {
            self.active_by_key.insert(record.key, id);
            if let Some(nonce) = record.nonce {
                self.nonce_holders.insert(nonce, id);
            }
        }
        if record.status == SubmissionStatus::Confirmed {
            if let Some(block) = record.confirmed_at_block {
                let entry = self.confirmed_block.entry(record.key).or_insert(block);
                *entry = (*entry).max(block);
            }
        }
    }

    /// Removes `record` from the token, key and nonce indices. The
    /// latest-by-key and confirmed-block indices are left alone.
    fn unindex(&mut self, record: &SubmissionRecord) {
        let id = record.request_id;
        if self.active_by_key.get(&record.key) == Some(&id) {
            self.active_by_key.remove(&record.key);
        }
        if let Some(nonce) = record.nonce {
            if self.nonce_holders.get(&nonce) == Some(&id) {
                self.nonce_holders.remove(&nonce);
            }
        }
        if self.by_token.get(&record.idempotency_token) == Some(&id) {
            self.by_token.remove(&record.idempotency_token);
        }
    }
}

//! Results reported by one watcher step.

use serde::Serialize;
use shared_types::{FailureCause, RequestId, TxHash};
use std::time::Duration;

/// Result of one broadcast cycle for a ready record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The record was no longer Pending, or another worker won it.
    Skipped,
    Broadcast { tx_hash: TxHash, nonce: u64 },
    Retrying { attempt: u32, delay: Duration },
    Failed(FailureCause),
}

/// Result of waiting on a broadcast transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackOutcome {
    Confirmed { block: u64 },
    Failed(FailureCause),
    /// Someone else moved the record on while it was being watched.
    Abandoned,
}

/// Result of reconciling a timed-out record against the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ReconcileOutcome {
    /// The write landed and is deep enough; the record is now Confirmed.
    Landed { block: u64 },
    /// The transaction landed but reverted; the slot was not written.
    Reverted { reason: String },
    /// The nonce was consumed by something else. Safe to resubmit.
    NotLanded,
    /// Nothing decisive yet; try again later.
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub resumed: Vec<RequestId>,
    pub orphaned: Vec<RequestId>,
}

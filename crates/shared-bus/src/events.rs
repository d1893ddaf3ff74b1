//! # Ledger Events
//!
//! Every event that flows through the shared bus. Subsystems publish state
//! changes here instead of calling each other; the read cache, for example,
//! learns about confirmations only through `SubmissionConfirmed`.

use serde::{Deserialize, Serialize};
use shared_types::{LogicalKey, RecordedError, RequestId, TxHash};

/// Subsystem identifiers used as event sources.
pub mod subsystem {
    pub const FINGERPRINT_STORE: u8 = 1;
    pub const SUBMISSION_QUEUE: u8 = 2;
    pub const CHAIN_WATCHER: u8 = 3;
    pub const READ_CACHE: u8 = 4;
    pub const API_GATEWAY: u8 = 6;
}

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LedgerEvent {
    // =========================================================================
    // SUBMISSION QUEUE
    // =========================================================================
    /// A write was validated and persisted as Pending.
    SubmissionAccepted {
        request_id: RequestId,
        key: LogicalKey,
    },

    /// A Pending write was withdrawn before broadcast.
    SubmissionCancelled {
        request_id: RequestId,
        key: LogicalKey,
    },

    // =========================================================================
    // CHAIN WATCHER
    // =========================================================================
    /// The contract call left the node with the given nonce.
    TransactionBroadcast {
        request_id: RequestId,
        key: LogicalKey,
        tx_hash: TxHash,
        nonce: u64,
    },

    /// A retryable failure sent the record back to Pending.
    SubmissionRetrying {
        request_id: RequestId,
        key: LogicalKey,
        attempt: u32,
        error: RecordedError,
        retry_in_ms: u64,
    },

    /// The transaction reached the configured confirmation depth.
    /// Consumed by the read cache to invalidate `key`. `tx_hash` is absent
    /// when reconciliation matched the on-chain value of a write whose
    /// broadcast never reported back.
    SubmissionConfirmed {
        request_id: RequestId,
        key: LogicalKey,
        tx_hash: Option<TxHash>,
        block_number: u64,
    },

    /// The record reached `Failed`.
    SubmissionFailed {
        request_id: RequestId,
        key: LogicalKey,
        error: RecordedError,
    },

    // =========================================================================
    // READ CACHE
    // =========================================================================
    CacheInvalidated { key: LogicalKey },

    // =========================================================================
    // DEAD LETTER QUEUE
    // =========================================================================
    /// Unrecoverable condition that needs operator attention.
    CriticalError {
        subsystem_id: u8,
        message: String,
    },
}

impl LedgerEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::SubmissionAccepted { .. } | Self::SubmissionCancelled { .. } => {
                EventTopic::Queue
            }
            Self::TransactionBroadcast { .. }
            | Self::SubmissionRetrying { .. }
            | Self::SubmissionConfirmed { .. }
            | Self::SubmissionFailed { .. } => EventTopic::Watcher,
            Self::CacheInvalidated { .. } => EventTopic::Cache,
            Self::CriticalError { .. } => EventTopic::DeadLetterQueue,
        }
    }

    /// Get the originating subsystem ID.
    #[must_use]
    pub fn source_subsystem(&self) -> u8 {
        match self {
            Self::SubmissionAccepted { .. } | Self::SubmissionCancelled { .. } => {
                subsystem::SUBMISSION_QUEUE
            }
            Self::TransactionBroadcast { .. }
            | Self::SubmissionRetrying { .. }
            | Self::SubmissionConfirmed { .. }
            | Self::SubmissionFailed { .. } => subsystem::CHAIN_WATCHER,
            Self::CacheInvalidated { .. } => subsystem::READ_CACHE,
            Self::CriticalError { subsystem_id, .. } => *subsystem_id,
        }
    }

    /// The record slot this event concerns, if any.
    #[must_use]
    pub fn key(&self) -> Option<&LogicalKey> {
        match self {
            Self::SubmissionAccepted { key, .. }
            | Self::SubmissionCancelled { key, .. }
            | Self::TransactionBroadcast { key, .. }
            | Self::SubmissionRetrying { key, .. }
            | Self::SubmissionConfirmed { key, .. }
            | Self::SubmissionFailed { key, .. }
            | Self::CacheInvalidated { key } => Some(key),
            Self::CriticalError { .. } => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Submission queue events.
    Queue,
    /// Chain watcher lifecycle events.
    Watcher,
    /// Read cache events.
    Cache,
    /// Dead Letter Queue for critical errors.
    DeadLetterQueue,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Source subsystems to include. Empty means all sources.
    pub source_subsystems: Vec<u8>,
    /// Record slots to include. Empty means all keys; keyless events always pass.
    pub keys: Vec<LogicalKey>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            ..Self::default()
        }
    }

    /// Create a filter for events from specific subsystems.
    #[must_use]
    pub fn from_subsystems(subsystems: Vec<u8>) -> Self {
        Self {
            source_subsystems: subsystems,
            ..Self::default()
        }
    }

    /// Narrow the filter to events about `key`.
    #[must_use]
    pub fn with_key(mut self, key: LogicalKey) -> Self {
        self.keys.push(key);
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let source_match = self.source_subsystems.is_empty()
            || self.source_subsystems.contains(&event.source_subsystem());

        let key_match = self.keys.is_empty()
            || event.key().map_or(true, |key| self.keys.contains(key));

        topic_match && source_match && key_match
    }
}

//! Ready queue of Pending request ids awaiting a watcher worker.
//!
//! FIFO by arrival. Entries sent back after a retryable failure carry a
//! `not_before` time and are skipped until it passes, without blocking the
//! entries behind them. A key never has more than one queued id because the
//! store admits only one active record per key.

use shared_types::{RequestId, Timestamp};
use std::collections::{HashSet, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ReadyEntry {
    id: RequestId,
    not_before: Timestamp,
}

/// Result of asking for the next id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextReady {
    Ready(RequestId),
    /// Nothing is ready yet; the earliest entry becomes ready at this time.
    WaitUntil(Timestamp),
    Empty,
}

#[derive(Debug, Default)]
pub struct ReadyQueue {
    entries: VecDeque<ReadyEntry>,
    queued: HashSet<RequestId>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id`. Returns false if it is already queued.
    pub fn push(&mut self, id: RequestId, not_before: Timestamp) -> bool {
        if !self.queued.insert(id) {
            return false;
        }
        self.entries.push_back(ReadyEntry { id, not_before });
        true
    }

    pub fn remove(&mut self, id: &RequestId) -> bool {
        if !self.queued.remove(id) {
            return false;
        }
        self.entries.retain(|entry| entry.id != *id);
        true
    }

    /// Takes the oldest entry whose `not_before` has passed.
    pub fn pop_ready(&mut self, now: Timestamp) -> NextReady {
        let position = self.entries.iter().position(|e| e.not_before <= now);
        if let Some(entry) = position.and_then(|pos| self.entries.remove(pos)) {
            self.queued.remove(&entry.id);
            return NextReady::Ready(entry.id);
        }
        self.entries
            .iter()
            .map(|e| e.not_before)
            .min()
            .map_or(NextReady::Empty, NextReady::WaitUntil)
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.queued.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = ReadyQueue::new();
        let a = RequestId::new();
        let b = RequestId::new();
        queue.push(a, 0);
        queue.push(b, 0);
        assert_eq!(queue.pop_ready(10), NextReady::Ready(a));
        assert_eq!(queue.pop_ready(10), NextReady::Ready(b));
        assert_eq!(queue.pop_ready(10), NextReady::Empty);
    }

    #[test]
    fn test_delayed_entry_does_not_block_later_ones() {
        let mut queue = ReadyQueue::new();
        let delayed = RequestId::new();
        let fresh = RequestId::new();
        queue.push(delayed, 500);
        queue.push(fresh, 0);

        assert_eq!(queue.pop_ready(100), NextReady::Ready(fresh));
        assert_eq!(queue.pop_ready(100), NextReady::WaitUntil(500));
        assert_eq!(queue.pop_ready(500), NextReady::Ready(delayed));
    }

    #[test]
    fn test_duplicate_push_and_remove() {
        let mut queue = ReadyQueue::new();
        let id = RequestId::new();
        assert!(queue.push(id, 0));
        assert!(!queue.push(id, 0));
        assert_eq!(queue.len(), 1);
        assert!(queue.remove(&id));
        assert!(!queue.contains(&id));
        assert!(queue.is_empty());
        assert!(!queue.remove(&id));
    }
}

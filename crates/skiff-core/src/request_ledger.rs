//! Hash → request status tracking with oldest-first dispatch.
//!
//! A ledger remembers every hash it has ever been told about. Entries are
//! never removed: a re-announced hash is a no-op and a resolved one simply
//! stays in flight forever. A failed request returns to the queue in its
//! original position, so the oldest interesting hash is always served first.

use std::collections::{BTreeMap, HashMap};

use crate::types::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Queued,
    InFlight,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    seq: u64,
    status: RequestStatus,
}

/// Insertion-ordered set of hashes awaiting or undergoing a fetch.
///
/// # Examples
///
/// ```
/// use skiff_core::request_ledger::RequestLedger;
/// use skiff_core::types::Hash256;
///
/// let mut ledger = RequestLedger::new();
/// ledger.add_hash(Hash256([1; 32]));
/// ledger.add_hash(Hash256([2; 32]));
/// assert_eq!(ledger.next_hash(), Some(Hash256([1; 32])));
/// assert!(!ledger.is_done());
/// assert_eq!(ledger.next_hash(), Some(Hash256([2; 32])));
/// assert!(ledger.is_done());
/// ```
#[derive(Debug, Default)]
pub struct RequestLedger {
    entries: HashMap<Hash256, Entry>,
    /// Queued entries keyed by insertion sequence.
    queue: BTreeMap<u64, Hash256>,
    next_seq: u64,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hash as interesting. Returns false if it was already known.
    pub fn add_hash(&mut self, hash: Hash256) -> bool {
        if self.entries.contains_key(&hash) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            hash,
            Entry {
                seq,
                status: RequestStatus::Queued,
            },
        );
        self.queue.insert(seq, hash);
        true
    }

    /// Take the oldest queued hash and mark it in flight.
    pub fn next_hash(&mut self) -> Option<Hash256> {
        let (_, hash) = self.queue.pop_first()?;
        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.status = RequestStatus::InFlight;
        }
        Some(hash)
    }

    /// The request for `hash` was answered. Returns false for unknown hashes.
    pub fn mark_done(&mut self, hash: &Hash256) -> bool {
        match self.entries.get_mut(hash) {
            Some(entry) => {
                if entry.status == RequestStatus::Queued {
                    self.queue.remove(&entry.seq);
                    entry.status = RequestStatus::InFlight;
                }
                true
            }
            None => false,
        }
    }

    /// The request for `hash` failed or timed out; queue it again.
    pub fn mark_failed(&mut self, hash: &Hash256) -> bool {
        match self.entries.get_mut(hash) {
            Some(entry) => {
                entry.status = RequestStatus::Queued;
                self.queue.insert(entry.seq, *hash);
                true
            }
            None => false,
        }
    }

    /// Re-queue a hash whether or not it was seen before.
    pub fn requeue(&mut self, hash: Hash256) {
        if !self.add_hash(hash) {
            self.mark_failed(&hash);
        }
    }

    /// True when nothing is waiting to be dispatched.
    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn status(&self, hash: &Hash256) -> Option<RequestStatus> {
        self.entries.get(hash).map(|e| e.status)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.entries.len() - self.queue.len()
    }
}

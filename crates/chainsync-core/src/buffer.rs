//! In-memory event buffer.
//!
//! Holds the most recent normalized events, newest first, deduplicated by
//! event id. All data is lost when the process exits; only the checkpoint
//! survives a restart.

use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::BlockchainEvent;

/// Filters accepted by [`EventBuffer::query`]. Every filter is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    /// Matches `from`, `to`, or any string-valued argument (case-insensitive).
    pub address: Option<String>,
    /// Matches the emitting contract address (case-insensitive).
    pub contract: Option<String>,
    /// Matches `eventType` or the raw `eventName` (case-insensitive).
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl EventQuery {
    fn matches(&self, event: &BlockchainEvent) -> bool {
        if let Some(addr) = non_empty(&self.address) {
            if !event.involves(addr) {
                return false;
            }
        }
        if let Some(contract) = non_empty(&self.contract) {
            if !event.contract_address.eq_ignore_ascii_case(contract) {
                return false;
            }
        }
        if let Some(ty) = non_empty(&self.event_type) {
            if !event.is_type(ty) {
                return false;
            }
        }
        true
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Bounded, deduplicated, newest-first event store.
#[derive(Debug)]
pub struct EventBuffer {
    /// Newest event at the front.
    events: VecDeque<BlockchainEvent>,
    /// Every id ever appended (until pruned), with its block number.
    seen: HashMap<String, u64>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(4_096)),
            seen: HashMap::new(),
            capacity,
        }
    }

    /// Returns `true` if an event with this id was already appended.
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    /// Insert at the front unless the id was seen before.
    ///
    /// Returns `true` if the event was new.
    pub fn append(&mut self, event: BlockchainEvent) -> bool {
        if self.seen.contains_key(&event.id) {
            return false;
        }
        self.seen.insert(event.id.clone(), event.block_number);
        self.events.push_front(event);
        true
    }

    /// Drop the oldest events beyond capacity. Returns how many were evicted.
    pub fn enforce_capacity(&mut self) -> usize {
        let excess = self.events.len().saturating_sub(self.capacity);
        self.events.truncate(self.capacity);
        excess
    }

    /// Forget seen ids of evicted events below `block`. Returns how many were dropped.
    ///
    /// Ids of events still held are always kept, so a re-scan can never put
    /// a second copy of a buffered event in front of the first.
    pub fn prune_seen(&mut self, block: u64) -> usize {
        let held: HashSet<&str> = self
            .events
            .iter()
            .filter(|e| e.block_number < block)
            .map(|e| e.id.as_str())
            .collect();
        let before = self.seen.len();
        self.seen.retain(|id, b| *b >= block || held.contains(id.as_str()));
        before - self.seen.len()
    }

    /// Filtered events, newest first, truncated to `query.limit`.
    pub fn query(&self, query: &EventQuery) -> Vec<BlockchainEvent> {
        let limit = query.limit.unwrap_or(usize::MAX);
        self.events
            .iter()
            .filter(|e| query.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of events currently buffered.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Size of the dedup seen-set.
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

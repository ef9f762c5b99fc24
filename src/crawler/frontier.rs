//! Frontier of discovered addresses
//!
//! The frontier owns four collections that change together under one lock:
//! - `pending`: items waiting to be handed out, lowest priority value first,
//!   FIFO within a priority
//! - `queued`: addresses of the items in `pending`
//! - `in_flight`: addresses handed out by `next` and not yet closed
//! - `visited`: addresses that reached a terminal state
//!
//! An address is in at most one of `queued`, `in_flight` and `visited`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Mutex;
use url::Url;

/// A discovered address waiting to be fetched
#[derive(Debug, Clone)]
pub struct FrontierItem {
    pub address: Url,

    /// Link distance from the seed (seed is 0)
    pub depth: u32,

    /// Lower values are handed out first
    pub priority: u32,

    /// Page on which the address was discovered
    pub parent: Option<Url>,

    pub discovered_at: DateTime<Utc>,

    /// Insertion order, breaks priority ties
    seq: u64,
}

// BinaryHeap is a max-heap: reverse both keys so the lowest priority value
// and then the earliest insertion pop first
impl Ord for FrontierItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FrontierItem {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for FrontierItem {}

/// Result of [`Frontier::add`]
///
/// Only `Enqueued` changes the frontier; the other variants are expected
/// policy rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Enqueued,
    /// Already queued, in flight or visited
    Duplicate,
    /// Depth beyond the configured maximum
    TooDeep,
    /// Pending items at the hard cap
    Full,
}

impl AddOutcome {
    pub fn enqueued(&self) -> bool {
        matches!(self, AddOutcome::Enqueued)
    }
}

/// Result of [`Frontier::next_or_idle`]
#[derive(Debug)]
pub enum FrontierPoll {
    Ready(FrontierItem),
    /// Nothing pending, but in-flight items may still add more
    Busy,
    /// Nothing pending and nothing in flight
    Idle,
}

/// Frontier counters for the run report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrontierStats {
    /// Items still pending
    pub queue_size: usize,
    pub visited_count: usize,
    /// Addresses ever accepted by `add`
    pub total_discovered: u64,
}

#[derive(Debug, Default)]
struct FrontierState {
    pending: BinaryHeap<FrontierItem>,
    queued: HashSet<String>,
    in_flight: HashSet<String>,
    visited: HashSet<String>,
    next_seq: u64,
}

impl FrontierState {
    fn knows(&self, key: &str) -> bool {
        self.queued.contains(key) || self.in_flight.contains(key) || self.visited.contains(key)
    }

    fn pop(&mut self) -> Option<FrontierItem> {
        let item = self.pending.pop()?;
        let key = item.address.as_str();
        self.queued.remove(key);
        self.in_flight.insert(key.to_string());
        Some(item)
    }
}

/// Deduplicated priority queue of addresses to crawl
#[derive(Debug)]
pub struct Frontier {
    max_depth: u32,
    capacity: usize,
    state: Mutex<FrontierState>,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `max_depth` - Items deeper than this are rejected
    /// * `capacity` - Maximum number of pending items
    pub fn new(max_depth: u32, capacity: usize) -> Self {
        Self {
            max_depth,
            capacity: capacity.max(1),
            state: Mutex::new(FrontierState::default()),
        }
    }

    /// Adds a discovered address
    ///
    /// The address must already be normalized; its string form is the dedup key.
    pub fn add(&self, address: Url, depth: u32, priority: u32, parent: Option<Url>) -> AddOutcome {
        if depth > self.max_depth {
            return AddOutcome::TooDeep;
        }

        let mut state = self.lock();
        let key = address.as_str();
        if state.knows(key) {
            return AddOutcome::Duplicate;
        }
        if state.pending.len() >= self.capacity {
            tracing::debug!("Frontier full, dropping {}", address);
            return AddOutcome::Full;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.queued.insert(key.to_string());
        state.pending.push(FrontierItem {
            address,
            depth,
            priority,
            parent,
            discovered_at: Utc::now(),
            seq,
        });
        AddOutcome::Enqueued
    }

    /// Removes and returns the next item, if any
    ///
    /// The address counts as in flight until [`Frontier::mark_visited`].
    pub fn next(&self) -> Option<FrontierItem> {
        self.lock().pop()
    }

    /// Like [`Frontier::next`], but tells an empty queue with work still in
    /// flight apart from a finished one
    ///
    /// Both are decided under the same lock, so a worker cannot see an empty
    /// queue and then a zero in-flight count from a sibling that enqueued
    /// children in between.
    pub fn next_or_idle(&self) -> FrontierPoll {
        let mut state = self.lock();
        match state.pop() {
            Some(item) => FrontierPoll::Ready(item),
            None if state.in_flight.is_empty() => FrontierPoll::Idle,
            None => FrontierPoll::Busy,
        }
    }

    /// Closes an address for the rest of the run; idempotent
    ///
    /// A still pending address is withdrawn from the queue.
    pub fn mark_visited(&self, address: &Url) {
        let mut state = self.lock();
        let key = address.as_str();
        state.in_flight.remove(key);
        if state.queued.remove(key) {
            state.pending.retain(|item| item.address.as_str() != key);
        }
        if !state.visited.contains(key) {
            state.visited.insert(key.to_string());
        }
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Items handed out by `next` and not yet marked visited
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn visited_len(&self) -> usize {
        self.lock().visited.len()
    }

    pub fn is_visited(&self, address: &Url) -> bool {
        self.lock().visited.contains(address.as_str())
    }

    pub fn stats(&self) -> FrontierStats {
        let state = self.lock();
        FrontierStats {
            queue_size: state.pending.len(),
            visited_count: state.visited.len(),
            total_discovered: state.next_seq,
        }
    }

    /// Drops every pending item and returns them
    pub fn drain_pending(&self) -> Vec<FrontierItem> {
        let mut state = self.lock();
        state.queued.clear();
        std::mem::take(&mut state.pending).into_vec()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierState> {
        // A panic while holding the lock leaves the sets consistent
        // because every mutation is a single insert or remove
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

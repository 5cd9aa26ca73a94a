//! Retransmission queue for the sender.
//!
//! Every DATA segment the sender has put on the wire but not yet seen
//! acknowledged is tracked here as an [`InflightSegment`]: its sequence
//! number (the byte offset of its payload) and the instant at which it must
//! be resent.
//!
//! # Structure
//!
//! - A min-heap ordered by `(resend_at, seq)` yields the earliest deadline
//!   in `O(log n)` without re-sorting the whole set after every send.
//! - A map `seq -> resend_at` is the source of truth for membership.  An
//!   acknowledgement only removes the map entry; the heap entry goes stale
//!   and is discarded lazily when it reaches the top.
//!
//! Because sequence numbers are file offsets the queue never stores
//! payloads: the sender re-reads the bytes from the file on resend.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use tokio::time::Instant;

/// Stale heap entries tolerated before the heap is rebuilt.
const COMPACT_SLACK: usize = 64;

/// A DATA segment awaiting acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InflightSegment {
    /// Byte offset of the segment's payload.
    pub seq: u32,
    /// When the segment should be resent if still unacknowledged.
    pub resend_at: Instant,
}

/// Deadline-ordered set of in-flight segments.
#[derive(Debug, Default)]
pub struct RetransmitQueue {
    heap: BinaryHeap<Reverse<(Instant, u32)>>,
    live: HashMap<u32, Instant>,
}

impl RetransmitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `seq` with a resend deadline of `resend_at`.
    ///
    /// A segment already in flight has its deadline replaced.
    pub fn push(&mut self, seq: u32, resend_at: Instant) {
        self.live.insert(seq, resend_at);
        self.heap.push(Reverse((resend_at, seq)));
        self.maybe_compact();
    }

    /// Forget `seq` because it was acknowledged.
    ///
    /// Returns `false` when `seq` was not in flight (duplicate or stray ACK).
    pub fn remove(&mut self, seq: u32) -> bool {
        self.live.remove(&seq).is_some()
    }

    /// Remove and return the earliest segment if its deadline is at or
    /// before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<InflightSegment> {
        let next = self.peek()?;
        if next.resend_at > now {
            return None;
        }
        self.heap.pop();
        self.live.remove(&next.seq);
        Some(next)
    }

    /// Earliest pending resend deadline.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.peek().map(|s| s.resend_at)
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.live.contains_key(&seq)
    }

    /// Number of segments in flight.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Earliest live entry, discarding stale heap tops on the way.
    fn peek(&mut self) -> Option<InflightSegment> {
        while let Some(&Reverse((resend_at, seq))) = self.heap.peek() {
            if self.live.get(&seq) == Some(&resend_at) {
                return Some(InflightSegment { seq, resend_at });
            }
            self.heap.pop();
        }
        None
    }

    fn maybe_compact(&mut self) {
        if self.heap.len() <= 2 * self.live.len() + COMPACT_SLACK {
            return;
        }
        self.heap = self
            .live
            .iter()
            .map(|(&seq, &resend_at)| Reverse((resend_at, seq)))
            .collect();
    }
}

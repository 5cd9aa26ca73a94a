//! Receiver-side acknowledgement batching.
//!
//! The receiver does not answer every DATA segment the moment it arrives.
//! Sequence numbers are queued in [`AckBatcher`] and emitted together once
//! the arrival burst has gone quiet for one batching delay, at most
//! `max_per_batch` ACK datagrams per flush.
//!
//! # Sets
//!
//! ```text
//!   enqueue ──▶ pending ──flush──▶ recently_acked
//!                  ▲                      │
//!                  └─────── reack ────────┘
//! ```
//!
//! A DATA segment whose offset is in `recently_acked` was already stored and
//! acknowledged; the sender simply missed the ACK.  [`AckBatcher::reack`]
//! moves it back to `pending` so it is acknowledged again without being
//! stored twice.
//!
//! `pending` is a queue, not a set: every accepted copy of a segment queues
//! its own ACK, so a segment received twice before a flush is acknowledged
//! twice.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

use crate::packet::encode_ack;
use crate::socket::DatagramSink;

#[derive(Debug)]
pub struct AckBatcher {
    /// ACKs to emit, in arrival order.
    pending: VecDeque<u32>,
    /// Queued ACK count per sequence number.
    pending_count: HashMap<u32, usize>,
    /// Sequence numbers whose ACK has been emitted.
    recently_acked: HashSet<u32>,
    /// When the next flush is due, if one is scheduled.
    ack_at: Option<Instant>,
    /// Cleared for the duration of a flush.
    accepting: bool,
    max_per_batch: usize,
    batch_delay: Duration,
}

impl AckBatcher {
    pub fn new(max_per_batch: usize, batch_delay: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            pending_count: HashMap::new(),
            recently_acked: HashSet::new(),
            ack_at: None,
            accepting: true,
            max_per_batch: max_per_batch.max(1),
            batch_delay,
        }
    }

    /// Queue one ACK for `seq`.
    ///
    /// Returns `false` when an ACK for `seq` was already queued; the new one
    /// is queued behind it all the same.
    pub fn enqueue(&mut self, seq: u32) -> bool {
        self.pending.push_back(seq);
        let count = self.pending_count.entry(seq).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Re-queue a sequence number that was already acknowledged.
    ///
    /// Returns `false` when `seq` has not been acknowledged before, in which
    /// case the caller must treat the segment as new.
    pub fn reack(&mut self, seq: u32) -> bool {
        if !self.recently_acked.remove(&seq) {
            return false;
        }
        self.enqueue(seq);
        true
    }

    /// `true` when an ACK for `seq` has been emitted and not re-queued since.
    pub fn was_acked(&self, seq: u32) -> bool {
        self.recently_acked.contains(&seq)
    }

    pub fn is_pending(&self, seq: u32) -> bool {
        self.pending_count.contains_key(&seq)
    }

    /// ACK datagrams queued, counting repeats.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// (Re)arm the flush deadline one batching delay after `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.ack_at = Some(now + self.batch_delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.ack_at
    }

    /// `true` when a scheduled flush is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.ack_at.is_some_and(|at| now >= at)
    }

    /// `false` only while a flush is running.
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Emit up to `max_per_batch` pending ACKs to `dest`.
    ///
    /// Each ACK that is sent moves its sequence number to `recently_acked`.
    /// A send failure is logged and ends the flush; unsent sequence numbers
    /// stay pending for the next flush.  Returns the number of ACKs sent.
    pub async fn flush<S: DatagramSink>(&mut self, sink: &S, dest: SocketAddr) -> usize {
        let Self {
            pending,
            pending_count,
            recently_acked,
            ack_at,
            accepting,
            max_per_batch,
            ..
        } = self;
        let _pause = PauseGuard::new(accepting);

        let mut sent = 0usize;
        while sent < *max_per_batch {
            let Some(&seq) = pending.front() else {
                break;
            };
            if let Err(e) = sink.send_datagram(&encode_ack(seq), dest).await {
                log::error!(
                    "[ack] sending ACK {seq} to {dest} failed: {e}; {} left pending",
                    pending.len()
                );
                break;
            }
            pending.pop_front();
            if let Some(count) = pending_count.get_mut(&seq) {
                *count -= 1;
                if *count == 0 {
                    pending_count.remove(&seq);
                }
            }
            recently_acked.insert(seq);
            sent += 1;
            log::debug!("[ack] → ACK {seq}");
        }

        if pending.is_empty() {
            *ack_at = None;
        }
        if sent > 0 {
            log::info!("[ack] flushed {sent} ACK(s), {} pending", pending.len());
        }
        sent
    }
}

/// Clears the accepting flag and restores it on drop, on every exit path.
struct PauseGuard<'a>(&'a mut bool);

impl<'a> PauseGuard<'a> {
    fn new(flag: &'a mut bool) -> Self {
        *flag = false;
        Self(flag)
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        *self.0 = true;
    }
}

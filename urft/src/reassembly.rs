//! Inbound segment reassembly.
//!
//! DATA segments may arrive in any order.  [`ReassemblyBuffer`] holds
//! payloads keyed by byte offset until the contiguous prefix reaches them,
//! then hands them out in file order.
//!
//! `next_offset` is the low-water mark: every byte below it has already been
//! released to storage, and it only ever grows.  Payloads below the mark, or
//! at an offset that is already buffered, are duplicates and are dropped.

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    next_offset: u32,
    pending: BTreeMap<u32, Vec<u8>>,
    buffered_bytes: usize,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the next byte expected in order.
    pub fn next_offset(&self) -> u32 {
        self.next_offset
    }

    /// Store `payload` at `offset`.
    ///
    /// Returns `false` when the payload duplicates bytes already released or
    /// already held.
    pub fn insert(&mut self, offset: u32, payload: Vec<u8>) -> bool {
        if offset < self.next_offset || self.pending.contains_key(&offset) {
            return false;
        }
        self.buffered_bytes += payload.len();
        self.pending.insert(offset, payload);
        true
    }

    /// Remove the payload that starts exactly at `next_offset`, advancing the
    /// mark past it.
    pub fn pop_next(&mut self) -> Option<Vec<u8>> {
        let payload = self.pending.remove(&self.next_offset)?;
        self.buffered_bytes -= payload.len();
        self.next_offset = self.next_offset.saturating_add(payload.len() as u32);
        Some(payload)
    }

    /// Drain every payload that is now contiguous with the mark.
    pub fn drain_contiguous(&mut self) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| self.pop_next()).collect()
    }

    /// Number of out-of-order payloads held.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total payload bytes held.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }
}

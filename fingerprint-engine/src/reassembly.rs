//! TCP reassembler (spec.md section 4.4).
//!
//! Collects contiguous segments of one direction of one flow until a
//! previously-signalled length target (`additional_bytes_needed`) is met, so
//! a handshake message split across TCP segments can be parsed once as a
//! single buffer. State machine, per flow:
//!
//! ```text
//! IDLE    -> PENDING   on copy_packet(needed>0): store first fragment, set expected = needed
//! PENDING -> PENDING   on copy_packet: append if sequence is contiguous; drop out-of-order
//! PENDING -> COMPLETE  on copy_packet, when assembled_len >= expected
//! PENDING -> REAPED    on reap, when now - ts > TTL; the partial is returned
//! any     -> IDLE      on remove_segment
//! ```
//!
//! Design note (c) in spec.md section 9 resolves an open question in the
//! source: `reap` runs on *every* touch of the reassembler here, not just
//! some TCP code paths, for deterministic TTL behaviour.

use crate::flow::FlowKey;
use crate::lru::LruMap;

/// Outcome of feeding one segment to the reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyResult {
    /// More data is still required to reach the signalled length.
    Incomplete,
    /// The signalled length has been reached; the buffer is complete and the
    /// flow's pending state has been removed.
    Complete(Vec<u8>),
    /// The segment was out of order (did not extend the pending buffer
    /// contiguously) and was dropped.
    OutOfOrder,
}

struct SegmentBuffer {
    expected: usize,
    next_seq: u32,
    buf: Vec<u8>,
    last_touch: u64,
}

/// Bounded TCP reassembly table. On overflow, the oldest pending entry (by
/// the LRU table's own recency tracking) is reaped to make room.
pub struct Reassembler {
    table: LruMap<FlowKey, SegmentBuffer>,
    ttl_seconds: u64,
}

impl Reassembler {
    pub fn new(capacity: usize, ttl_seconds: u64) -> Self {
        Reassembler { table: LruMap::with_capacity(capacity), ttl_seconds }
    }

    /// Append a segment at TCP sequence `seq`, carrying `payload`. `needed`
    /// is the `additional_bytes_needed` value signalled by a partial parse
    /// of the first fragment; for subsequent fragments of an already-pending
    /// flow, pass the previously-signalled total (it is ignored once a
    /// pending entry already exists).
    pub fn copy_packet(
        &mut self,
        key: FlowKey,
        ts: u64,
        seq: u32,
        payload: &[u8],
        needed: usize,
    ) -> ReassemblyResult {
        self.reap(ts);

        if let Some(state) = self.table.get_mut(&key) {
            if seq != state.next_seq {
                return ReassemblyResult::OutOfOrder;
            }
            state.buf.extend_from_slice(payload);
            state.next_seq = state.next_seq.wrapping_add(payload.len() as u32);
            state.last_touch = ts;
            if state.buf.len() >= state.expected {
                let state = self.table.remove(&key).expect("just matched above");
                return ReassemblyResult::Complete(state.buf);
            }
            return ReassemblyResult::Incomplete;
        }

        if needed == 0 {
            return ReassemblyResult::OutOfOrder;
        }

        let mut buf = Vec::with_capacity(needed.min(1 << 20));
        buf.extend_from_slice(payload);
        let next_seq = seq.wrapping_add(payload.len() as u32);
        if buf.len() >= needed {
            return ReassemblyResult::Complete(buf);
        }
        self.table.insert(key, SegmentBuffer { expected: needed, next_seq, buf, last_touch: ts });
        ReassemblyResult::Incomplete
    }

    /// Fast path: returns `Some(buffer)` iff this segment completes an
    /// already-pending reassembly, removing the pending state atomically.
    /// Returns `None` for everything else (including a segment that starts
    /// or extends a still-incomplete reassembly — `copy_packet` handles
    /// those).
    pub fn check_packet(&mut self, key: FlowKey, ts: u64, seq: u32, payload: &[u8]) -> Option<Vec<u8>> {
        self.reap(ts);
        if !self.table.contains_key(&key) {
            return None;
        }
        match self.copy_packet(key, ts, seq, payload, 0) {
            ReassemblyResult::Complete(buf) => Some(buf),
            _ => None,
        }
    }

    /// Whether a reassembly is already pending for `key`. The processor uses
    /// this to decide whether an arriving segment is a fresh message (probe
    /// it) or a continuation fragment (never re-probe those).
    pub fn is_pending(&self, key: &FlowKey) -> bool {
        self.table.contains_key(key)
    }

    pub fn remove_segment(&mut self, key: &FlowKey) -> Option<Vec<u8>> {
        self.table.remove(key).map(|s| s.buf)
    }

    /// Remove and return any pending partial older than the configured TTL,
    /// measured in packet-timestamp units (not wall clock), per spec.md
    /// section 5. Called on every `copy_packet`/`check_packet` invocation as
    /// well as being exposed for the processor's explicit per-packet sweep.
    pub fn reap(&mut self, now: u64) -> Vec<(FlowKey, Vec<u8>)> {
        let mut expired = Vec::new();
        let stale_keys: Vec<FlowKey> = self
            .table
            .iter_lru_order()
            .take_while(|(_, state)| now.saturating_sub(state.last_touch) > self.ttl_seconds)
            .map(|(k, _)| *k)
            .collect();
        for key in stale_keys {
            if let Some(state) = self.table.remove(&key) {
                expired.push((key, state.buf));
            }
        }
        expired
    }

    pub fn pending_len(&self) -> usize {
        self.table.len()
    }
}

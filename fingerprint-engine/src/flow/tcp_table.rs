//! TCP flow table (spec.md section 3/4.3): `key -> {syn_seq, syn_ts, seen_data}`.

use crate::flow::key::FlowKey;
use crate::lru::LruMap;

#[derive(Debug, Clone, Copy)]
struct TcpFlowState {
    syn_seq: u32,
    syn_ts: u64,
    seen_data: bool,
}

pub struct TcpFlowTable {
    table: LruMap<FlowKey, TcpFlowState>,
}

impl TcpFlowTable {
    pub fn with_capacity(capacity: usize) -> Self {
        TcpFlowTable { table: LruMap::with_capacity(capacity) }
    }

    /// Record the initial sequence number observed on a SYN for `key`.
    pub fn syn_packet(&mut self, key: FlowKey, ts: u64, seq: u32) {
        self.table.insert(key, TcpFlowState { syn_seq: seq, syn_ts: ts, seen_data: false });
    }

    /// Whether this worker has a recorded SYN for `key`, i.e. whether
    /// [`Self::is_first_data_packet`] has a basis to judge from.
    pub fn contains(&self, key: &FlowKey) -> bool {
        self.table.contains_key(key)
    }

    /// Returns `true` exactly once per flow: the first time a data-bearing
    /// segment arrives whose sequence number equals `syn_seq + 1`.
    pub fn is_first_data_packet(&mut self, key: &FlowKey, _ts: u64, seq: u32) -> bool {
        let Some(state) = self.table.get_mut(key) else {
            return false;
        };
        if state.seen_data {
            return false;
        }
        if seq == state.syn_seq.wrapping_add(1) {
            state.seen_data = true;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn key() -> FlowKey {
        FlowKey::v4(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(1, 1, 1, 1), 5555, 443, 6)
    }

    #[test]
    fn first_data_packet_detected_once() {
        let mut t = TcpFlowTable::with_capacity(16);
        let k = key();
        t.syn_packet(k, 0, 1000);
        assert!(t.is_first_data_packet(&k, 1, 1001));
        assert!(!t.is_first_data_packet(&k, 2, 1001));
        assert!(!t.is_first_data_packet(&k, 3, 2000));
    }

    #[test]
    fn non_matching_sequence_is_not_first_data() {
        let mut t = TcpFlowTable::with_capacity(16);
        let k = key();
        t.syn_packet(k, 0, 1000);
        assert!(!t.is_first_data_packet(&k, 1, 5000));
    }

    #[test]
    fn unknown_flow_is_never_first_data() {
        let mut t = TcpFlowTable::with_capacity(16);
        assert!(!t.is_first_data_packet(&key(), 1, 1001));
    }
}

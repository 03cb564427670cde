//! IP flow table (spec.md section 3/4.3): `key -> first_seen_timestamp`.

use crate::flow::key::FlowKey;
use crate::lru::LruMap;

pub struct IpFlowTable {
    table: LruMap<FlowKey, u64>,
}

impl IpFlowTable {
    pub fn with_capacity(capacity: usize) -> Self {
        IpFlowTable { table: LruMap::with_capacity(capacity) }
    }

    /// Inserts `key -> ts` if absent and returns `true`; if already present,
    /// leaves it untouched (first-seen semantics) and returns `false`.
    pub fn flow_is_new(&mut self, key: FlowKey, ts: u64) -> bool {
        if self.table.contains_key(&key) {
            let _ = self.table.get(&key); // still counts as activity for LRU purposes
            false
        } else {
            self.table.insert(key, ts);
            true
        }
    }

    pub fn first_seen(&mut self, key: &FlowKey) -> Option<u64> {
        self.table.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn key(n: u8) -> FlowKey {
        FlowKey::v4(Ipv4Addr::new(10, 0, 0, n), Ipv4Addr::new(1, 1, 1, 1), 1000 + n as u16, 443, 6)
    }

    #[test]
    fn first_flow_is_new_second_is_not() {
        let mut t = IpFlowTable::with_capacity(16);
        let k = key(1);
        assert!(t.flow_is_new(k, 100));
        assert!(!t.flow_is_new(k, 101));
        assert!(!t.flow_is_new(k, 102));
    }

    #[test]
    fn capacity_eviction_allows_flow_is_new_again() {
        let mut t = IpFlowTable::with_capacity(2);
        assert!(t.flow_is_new(key(1), 1));
        assert!(t.flow_is_new(key(2), 2));
        assert!(t.flow_is_new(key(3), 3)); // evicts key(1)
        assert!(t.flow_is_new(key(1), 4)); // key(1) was evicted, so it's "new" again
    }
}

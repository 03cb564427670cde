//! Generic fixed-capacity LRU map shared by the flow tables (spec.md section
//! 4.3), the TCP reassembly table (section 4.4), and the fingerprint
//! prevalence cache (section 4.7).
//!
//! Backed by a slab of intrusive doubly-linked nodes so that lookup, insert,
//! and "touch" (move-to-front) are all O(1) — spec.md requires this for the
//! flow tables. A `HashMap<K, usize>` maps keys to slab indices; `ahash` is
//! used for the hasher, matching the teacher's dependency on `ahash` for its
//! hot-path maps. Slots are `Option<Node<..>>` so freed slots can be reused
//! without any unsafe code (the crate forbids it, per the teacher).

use ahash::AHashMap;

type NodeIdx = usize;
const NIL: NodeIdx = usize::MAX;

struct Node<K, V> {
    key: K,
    value: V,
    prev: NodeIdx,
    next: NodeIdx,
}

/// A fixed-capacity map that evicts the least-recently-touched entry when
/// full. "Touch" happens on both successful lookup and insert.
pub struct LruMap<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    index: AHashMap<K, NodeIdx>,
    head: NodeIdx, // most recently used
    tail: NodeIdx, // least recently used
    free: Vec<NodeIdx>,
    capacity: usize,
}

impl<K, V> LruMap<K, V>
where
    K: std::hash::Hash + Eq + Clone,
{
    pub fn with_capacity(capacity: usize) -> Self {
        LruMap {
            slots: Vec::with_capacity(capacity.min(1 << 16)),
            index: AHashMap::with_capacity(capacity.min(1 << 16)),
            head: NIL,
            tail: NIL,
            free: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    fn node(&self, idx: NodeIdx) -> &Node<K, V> {
        self.slots[idx].as_ref().expect("slab index always points at a live node")
    }

    fn node_mut(&mut self, idx: NodeIdx) -> &mut Node<K, V> {
        self.slots[idx].as_mut().expect("slab index always points at a live node")
    }

    fn unlink(&mut self, idx: NodeIdx) {
        let (prev, next) = {
            let n = self.node(idx);
            (n.prev, n.next)
        };
        if prev != NIL {
            self.node_mut(prev).next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.node_mut(next).prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn push_front(&mut self, idx: NodeIdx) {
        let old_head = self.head;
        {
            let n = self.node_mut(idx);
            n.prev = NIL;
            n.next = old_head;
        }
        if old_head != NIL {
            self.node_mut(old_head).prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn touch(&mut self, idx: NodeIdx) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    /// Look up a key, promoting it to most-recently-used on hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        Some(&self.node(idx).value)
    }

    /// Look up without promoting — useful for read-mostly checks.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&idx| &self.node(idx).value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        Some(&mut self.node_mut(idx).value)
    }

    /// Evict the least-recently-used entry, if any. Returns the evicted pair.
    pub fn evict_lru(&mut self) -> Option<(K, V)> {
        if self.tail == NIL {
            return None;
        }
        let idx = self.tail;
        self.unlink(idx);
        self.free.push(idx);
        let node = self.slots[idx].take().expect("tail always points at a live node");
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    /// Insert or update a key. Returns the evicted entry if capacity was
    /// exceeded. Newly inserted and updated keys become most-recently-used.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.index.get(&key) {
            self.node_mut(idx).value = value;
            self.touch(idx);
            return None;
        }

        let evicted = if self.index.len() >= self.capacity {
            self.evict_lru()
        } else {
            None
        };

        let idx = match self.free.pop() {
            Some(i) => i,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.slots[idx] = Some(Node { key: key.clone(), value, prev: NIL, next: NIL });
        self.index.insert(key, idx);
        self.push_front(idx);
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.unlink(idx);
        self.free.push(idx);
        self.slots[idx].take().map(|n| n.value)
    }

    /// Iterate from least- to most-recently-used.
    pub fn iter_lru_order(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut cur = self.tail;
        std::iter::from_fn(move || {
            if cur == NIL {
                return None;
            }
            let node = self.node(cur);
            cur = node.prev;
            Some((&node.key, &node.value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_roundtrip() {
        let mut m: LruMap<u32, &str> = LruMap::with_capacity(4);
        m.insert(1, "a");
        m.insert(2, "b");
        assert_eq!(m.get(&1), Some(&"a"));
        assert_eq!(m.get(&2), Some(&"b"));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut m: LruMap<u32, u32> = LruMap::with_capacity(2);
        m.insert(1, 10);
        m.insert(2, 20);
        // touch 1 so 2 becomes LRU
        let _ = m.get(&1);
        let evicted = m.insert(3, 30);
        assert_eq!(evicted, Some((2, 20)));
        assert!(!m.contains_key(&2));
        assert!(m.contains_key(&1));
        assert!(m.contains_key(&3));
    }

    #[test]
    fn lru_eviction_scenario_from_spec() {
        // spec.md section 8 scenario 5, generalised to the shared LruMap.
        let mut m: LruMap<char, ()> = LruMap::with_capacity(2);
        m.insert('A', ());
        m.insert('B', ());
        m.insert('C', ());
        assert!(!m.contains_key(&'A'));
        assert!(m.contains_key(&'B'));
        assert!(m.contains_key(&'C'));
        assert!(m.len() <= m.capacity());
    }

    #[test]
    fn update_existing_key_does_not_grow() {
        let mut m: LruMap<u32, u32> = LruMap::with_capacity(4);
        m.insert(1, 10);
        m.insert(1, 11);
        assert_eq!(m.len(), 1);
        assert_eq!(m.get(&1), Some(&11));
    }

    #[test]
    fn remove_frees_slot_for_reuse() {
        let mut m: LruMap<u32, u32> = LruMap::with_capacity(4);
        m.insert(1, 10);
        m.remove(&1);
        assert!(!m.contains_key(&1));
        m.insert(2, 20);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn capacity_bound_holds_after_many_operations() {
        let mut m: LruMap<u32, u32> = LruMap::with_capacity(8);
        for i in 0..1000u32 {
            m.insert(i, i * 2);
            assert!(m.len() <= m.capacity());
        }
    }
}

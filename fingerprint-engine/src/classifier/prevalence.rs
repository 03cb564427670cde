//! Fingerprint prevalence tracking (spec.md section 4.6 "Prevalence").
//!
//! Two layers: an immutable `known` set seeded once at startup from
//! `fp_prevalence_tls.txt`, and a bounded adaptive LRU that learns
//! fingerprints seen repeatedly during this run. `known` is checked first so
//! steady-state lookups never touch the lock.

use crate::lru::LruMap;
use parking_lot::RwLock;
use std::collections::HashSet;

const DEFAULT_CAPACITY: usize = 100_000;

pub struct FingerprintPrevalence {
    known: HashSet<String>,
    adaptive: RwLock<LruMap<String, ()>>,
}

impl FingerprintPrevalence {
    pub fn new(capacity: usize) -> Self {
        FingerprintPrevalence { known: HashSet::new(), adaptive: RwLock::new(LruMap::with_capacity(capacity)) }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Seed the known set from a `fp_prevalence_tls.txt` buffer: one
    /// fingerprint per non-empty line.
    pub fn load_known(bytes: &[u8], capacity: usize) -> Self {
        let mut prevalence = Self::new(capacity);
        let text = String::from_utf8_lossy(bytes);
        for line in text.lines() {
            let line = line.trim();
            if !line.is_empty() {
                prevalence.seed_known(line);
            }
        }
        prevalence
    }

    /// Seed the immutable known set, called while loading
    /// `fp_prevalence_tls.txt` at startup, before any worker threads start.
    pub fn seed_known(&mut self, fingerprint: &str) {
        self.known.insert(fingerprint.to_string());
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        if self.known.contains(fingerprint) {
            return true;
        }
        self.adaptive.read().contains_key(&fingerprint.to_string())
    }

    /// Record an observation of `fingerprint`, promoting it in the adaptive
    /// LRU (or evicting the coldest entry to make room). A no-op for
    /// fingerprints already in the known set.
    pub fn update(&self, fingerprint: &str) {
        if self.known.contains(fingerprint) {
            return;
        }
        self.adaptive.write().insert(fingerprint.to_string(), ());
    }

    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    pub fn adaptive_len(&self) -> usize {
        self.adaptive.read().len()
    }
}

impl Default for FingerprintPrevalence {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_fingerprints_are_prevalent_without_updates() {
        let mut p = FingerprintPrevalence::new(10);
        p.seed_known("aabb");
        assert!(p.contains("aabb"));
        assert_eq!(p.adaptive_len(), 0);
    }

    #[test]
    fn adaptive_set_learns_unknown_fingerprints() {
        let p = FingerprintPrevalence::new(10);
        assert!(!p.contains("ccdd"));
        p.update("ccdd");
        assert!(p.contains("ccdd"));
    }

    #[test]
    fn adaptive_set_is_bounded() {
        let p = FingerprintPrevalence::new(4);
        for i in 0..10 {
            p.update(&format!("fp{i}"));
        }
        assert_eq!(p.adaptive_len(), 4);
    }

    #[test]
    fn update_on_known_fingerprint_is_noop() {
        let mut p = FingerprintPrevalence::new(4);
        p.seed_known("aabb");
        p.update("aabb");
        assert_eq!(p.adaptive_len(), 0);
    }
}

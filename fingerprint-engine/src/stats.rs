//! Per-run counters (spec.md section 6 `do_stats`/`max_stats_entries`,
//! supplemented from mercury's `pkt_proc.h` stats tracker): records emitted
//! per protocol, parser failures per protocol, reassembly reaps, and
//! classifier hit/miss/randomized counts.
//!
//! Shaped after the teacher's `telemetry::Metrics`: a set of named counters
//! shared behind an `Arc`, safe to bump from any worker thread. Unlike the
//! teacher's OpenTelemetry-backed counters, these are plain atomics behind a
//! `parking_lot::RwLock<HashMap<_>>` — no metrics exporter is in scope here,
//! only the in-process tallies `do_stats` gates.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Stats {
    enabled: bool,
    max_entries: usize,
    counters: RwLock<HashMap<String, AtomicU64>>,
}

impl Stats {
    pub fn new(enabled: bool, max_entries: usize) -> Self {
        Stats { enabled, max_entries, counters: RwLock::new(HashMap::new()) }
    }

    /// Increment the named counter by one. A no-op when stats are disabled.
    /// Once `max_entries` distinct keys have been recorded, further unseen
    /// keys are silently dropped rather than growing the table unbounded.
    pub fn bump(&self, key: &str) {
        if !self.enabled {
            return;
        }
        {
            let counters = self.counters.read();
            if let Some(counter) = counters.get(key) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut counters = self.counters.write();
        if let Some(counter) = counters.get(key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if counters.len() >= self.max_entries {
            return;
        }
        counters.insert(key.to_string(), AtomicU64::new(1));
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counters.read().get(key).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Snapshot every recorded counter, for a periodic log line or a
    /// `/stats`-style dump.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters.read().iter().map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed))).collect()
    }
}

/// Counter-key helpers so callers don't hand-format the same strings.
pub fn record_emitted(protocol: &str) -> String {
    format!("records_emitted.{protocol}")
}

pub fn parse_failure(protocol: &str) -> String {
    format!("parse_failures.{protocol}")
}

pub const REASSEMBLY_REAPS: &str = "reassembly_reaps";
pub const CLASSIFIER_HIT: &str = "classifier.hit";
pub const CLASSIFIER_MISS: &str = "classifier.miss";
pub const CLASSIFIER_RANDOMIZED: &str = "classifier.randomized";
pub const OUTPUT_DROPPED: &str = "output.dropped";
pub const OUTPUT_WRITE_ERRORS: &str = "output.write_errors";

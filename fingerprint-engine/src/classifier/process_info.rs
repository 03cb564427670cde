//! Per-fingerprint process distribution, as loaded from `fingerprint_db.json`
//! (spec.md section 3 "Process info").

use std::collections::HashMap;

/// One process's observed distribution under a single fingerprint.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub name: String,
    pub is_malware: bool,
    /// Number of observations of this process under this fingerprint.
    pub count: u64,
    pub ip_as: HashMap<u32, u64>,
    pub hostname_domains: HashMap<String, u64>,
    pub portname_applications: HashMap<u16, u64>,
    pub ip_ip: HashMap<String, u64>,
    pub hostname_sni: HashMap<String, u64>,
    /// Insertion-ordered: mercury's `os_info` preserves first-seen order so
    /// that ties in count report the most common OS observed first.
    pub os_info: Vec<(String, u64)>,
}

impl ProcessInfo {
    pub fn new(name: String, is_malware: bool, count: u64) -> Self {
        ProcessInfo {
            name,
            is_malware,
            count,
            ip_as: HashMap::new(),
            hostname_domains: HashMap::new(),
            portname_applications: HashMap::new(),
            ip_ip: HashMap::new(),
            hostname_sni: HashMap::new(),
            os_info: Vec::new(),
        }
    }

    pub fn push_os(&mut self, name: String, count: u64) {
        if let Some(entry) = self.os_info.iter_mut().find(|(n, _)| n == &name) {
            entry.1 += count;
        } else {
            self.os_info.push((name, count));
        }
    }
}

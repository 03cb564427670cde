//! Compiled fingerprint database (spec.md section 4.6 "Loading").
//!
//! `FingerprintDb::load_ndjson` consumes `fingerprint_db.json` line by line
//! and compiles each line straight into the log-space form `score.rs` scores
//! against, so scoring never touches the raw counts again.

use crate::asn::SubnetTable;
use crate::classifier::ports::port_name_to_number;
use crate::classifier::process_info::ProcessInfo;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

const AS_WEIGHT: f64 = 0.13924;
const DOMAIN_WEIGHT: f64 = 0.15590;
const PORT_WEIGHT: f64 = 0.00528;
const IP_WEIGHT: f64 = 0.56735;
const SNI_WEIGHT: f64 = 0.96941;

/// A single `(process index, log-space delta)` pair, applied to the working
/// score vector when a feature value is observed on an inbound packet.
#[derive(Debug, Clone, Copy)]
pub struct Update {
    pub index: usize,
    pub value: f64,
}

/// The compiled form of one `fingerprint_db.json` line. All fields are
/// indexed by the same `process_name`/`malware`/`process_prior` position.
#[derive(Debug)]
pub struct FingerprintData {
    pub process_name: Vec<String>,
    pub malware: Vec<bool>,
    /// Log-space prior per process, already folded in with `base_prior`.
    pub process_prior: Vec<f64>,
    pub process_os_info: Vec<Vec<(String, u64)>>,
    pub total_count: u64,
    pub base_prior: f64,
    pub as_updates: HashMap<u32, Vec<Update>>,
    pub domain_updates: HashMap<String, Vec<Update>>,
    pub port_updates: HashMap<u16, Vec<Update>>,
    pub ip_updates: HashMap<String, Vec<Update>>,
    pub sni_updates: HashMap<String, Vec<Update>>,
    pub subnets: Arc<SubnetTable>,
}

impl FingerprintData {
    fn compile(
        total_count: u64,
        processes: Vec<ProcessInfo>,
        subnets: Arc<SubnetTable>,
    ) -> Self {
        let base_prior = (1.0_f64 / total_count as f64).ln();
        let weight_sum = AS_WEIGHT + DOMAIN_WEIGHT + PORT_WEIGHT + IP_WEIGHT + SNI_WEIGHT;

        let mut process_name = Vec::with_capacity(processes.len());
        let mut malware = Vec::with_capacity(processes.len());
        let mut process_prior = Vec::with_capacity(processes.len());
        let mut process_os_info = Vec::with_capacity(processes.len());
        let mut as_updates: HashMap<u32, Vec<Update>> = HashMap::new();
        let mut domain_updates: HashMap<String, Vec<Update>> = HashMap::new();
        let mut port_updates: HashMap<u16, Vec<Update>> = HashMap::new();
        let mut ip_updates: HashMap<String, Vec<Update>> = HashMap::new();
        let mut sni_updates: HashMap<String, Vec<Update>> = HashMap::new();

        for (index, p) in processes.into_iter().enumerate() {
            process_name.push(p.name);
            malware.push(p.is_malware);
            process_os_info.push(p.os_info);

            let prob_process_given_fp = p.count as f64 / total_count as f64;
            let score = prob_process_given_fp.ln();
            process_prior.push(score.max((0.1_f64).ln()) + base_prior * weight_sum);

            for (as_number, count) in &p.ip_as {
                let value = ((*count as f64 / total_count as f64).ln() - base_prior) * AS_WEIGHT;
                as_updates.entry(*as_number).or_default().push(Update { index, value });
            }
            for (domain, count) in &p.hostname_domains {
                let value = ((*count as f64 / total_count as f64).ln() - base_prior) * DOMAIN_WEIGHT;
                domain_updates.entry(domain.clone()).or_default().push(Update { index, value });
            }
            for (port, count) in &p.portname_applications {
                let value = ((*count as f64 / total_count as f64).ln() - base_prior) * PORT_WEIGHT;
                port_updates.entry(*port).or_default().push(Update { index, value });
            }
            for (ip, count) in &p.ip_ip {
                let value = ((*count as f64 / total_count as f64).ln() - base_prior) * IP_WEIGHT;
                ip_updates.entry(ip.clone()).or_default().push(Update { index, value });
            }
            for (sni, count) in &p.hostname_sni {
                let value = ((*count as f64 / total_count as f64).ln() - base_prior) * SNI_WEIGHT;
                sni_updates.entry(sni.clone()).or_default().push(Update { index, value });
            }
        }

        FingerprintData {
            process_name,
            malware,
            process_prior,
            process_os_info,
            total_count,
            base_prior,
            as_updates,
            domain_updates,
            port_updates,
            ip_updates,
            sni_updates,
            subnets,
        }
    }
}

/// The full compiled database: fingerprint string -> compiled process
/// distribution, plus the global mode flags `fingerprint_db.json` itself
/// establishes as it loads (spec.md section 4.6 "Modes").
#[derive(Default)]
pub struct FingerprintDb {
    pub entries: HashMap<String, FingerprintData>,
    /// Set once any process beyond the first two carries a `malware` field.
    pub malware_mode: bool,
    /// Set once any process carries `classes_ip_ip` or `classes_hostname_sni`.
    pub extended_metadata_mode: bool,
}

#[derive(Deserialize)]
struct RawFingerprintLine {
    str_repr: Option<String>,
    total_count: Option<u64>,
    process_info: Option<Vec<RawProcessInfo>>,
}

#[derive(Deserialize)]
struct RawProcessInfo {
    process: Option<String>,
    count: Option<u64>,
    malware: Option<bool>,
    #[serde(default)]
    classes_hostname_domains: HashMap<String, serde_json::Value>,
    #[serde(default)]
    classes_ip_as: HashMap<String, serde_json::Value>,
    #[serde(default)]
    classes_port_applications: HashMap<String, serde_json::Value>,
    #[serde(default)]
    classes_ip_ip: HashMap<String, serde_json::Value>,
    #[serde(default)]
    classes_hostname_sni: HashMap<String, serde_json::Value>,
    #[serde(default)]
    os_info: HashMap<String, serde_json::Value>,
}

fn as_u64(v: &serde_json::Value) -> Option<u64> {
    v.as_u64()
}

impl FingerprintDb {
    pub fn new() -> Self {
        FingerprintDb::default()
    }

    /// Compile every line of a `fingerprint_db.json` NDJSON buffer.
    pub fn load_ndjson(
        bytes: &[u8],
        fp_proc_threshold: f64,
        proc_dst_threshold: f64,
        report_os: bool,
        subnets: Arc<SubnetTable>,
    ) -> Self {
        let mut db = FingerprintDb::new();
        let text = String::from_utf8_lossy(bytes);
        for line in text.lines() {
            db.process_line(line, fp_proc_threshold, proc_dst_threshold, report_os, Arc::clone(&subnets));
        }
        db
    }

    /// Compile one NDJSON line of `fingerprint_db.json` into the database.
    /// Malformed lines are skipped and logged, matching the hot-path "skip,
    /// don't crash" discipline used throughout this engine; this runs at
    /// startup, not per-packet, but resource files are not trusted input
    /// either.
    pub fn process_line(
        &mut self,
        line: &str,
        fp_proc_threshold: f64,
        proc_dst_threshold: f64,
        report_os: bool,
        subnets: Arc<SubnetTable>,
    ) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let raw: RawFingerprintLine = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "fingerprint_db.json: skipping malformed line");
                return;
            }
        };

        let (Some(str_repr), Some(total_count), Some(raw_processes)) =
            (raw.str_repr, raw.total_count, raw.process_info)
        else {
            return;
        };
        if total_count == 0 || raw_processes.is_empty() {
            return;
        }

        let mut processes = Vec::with_capacity(raw_processes.len());
        for (process_number, rp) in raw_processes.into_iter().enumerate() {
            let count = rp.count.unwrap_or(0);
            let malware = rp.malware.unwrap_or(false);
            if rp.malware.is_some() {
                self.malware_mode = true;
            }

            // The first two processes in a fingerprint are always retained;
            // from the third on, only keep high-prevalence or malware
            // processes (spec.md section 4.6 "Process retention").
            if process_number > 1
                && (count as f64 / total_count as f64) < fp_proc_threshold
                && !malware
            {
                continue;
            }

            let name = rp.process.unwrap_or_default();
            let mut info = ProcessInfo::new(name, malware, count);

            for (domain, v) in &rp.classes_hostname_domains {
                if let Some(c) = as_u64(v) {
                    if count > 0 && (c as f64 / count as f64) > proc_dst_threshold {
                        info.hostname_domains.insert(domain.clone(), c);
                    }
                }
            }
            for (asn_str, v) in &rp.classes_ip_as {
                if let Some(c) = as_u64(v) {
                    if count == 0 || (c as f64 / count as f64) <= proc_dst_threshold {
                        continue;
                    }
                    if asn_str.eq_ignore_ascii_case("unknown") {
                        continue;
                    }
                    match asn_str.parse::<u32>() {
                        Ok(asn) => {
                            info.ip_as.insert(asn, c);
                        }
                        Err(_) => {
                            warn!(asn_str, "fingerprint_db.json: unparsable ip_as key, skipping");
                        }
                    }
                }
            }
            for (port_name, v) in &rp.classes_port_applications {
                if let Some(c) = as_u64(v) {
                    if count == 0 || (c as f64 / count as f64) <= proc_dst_threshold {
                        continue;
                    }
                    match port_name_to_number(port_name) {
                        Some(port) => {
                            info.portname_applications.insert(port, c);
                        }
                        None => {
                            warn!(port_name, "fingerprint_db.json: unexpected port application name");
                            info.portname_applications.insert(0, c);
                        }
                    }
                }
            }
            if !rp.classes_ip_ip.is_empty() {
                self.extended_metadata_mode = true;
            }
            for (ip, v) in &rp.classes_ip_ip {
                if let Some(c) = as_u64(v) {
                    if count > 0 && (c as f64 / count as f64) > proc_dst_threshold {
                        info.ip_ip.insert(ip.clone(), c);
                    }
                }
            }
            if !rp.classes_hostname_sni.is_empty() {
                self.extended_metadata_mode = true;
            }
            for (sni, v) in &rp.classes_hostname_sni {
                if let Some(c) = as_u64(v) {
                    if count > 0 && (c as f64 / count as f64) > proc_dst_threshold {
                        info.hostname_sni.insert(sni.clone(), c);
                    }
                }
            }
            if report_os {
                for (os_name, v) in &rp.os_info {
                    if os_name.is_empty() {
                        continue;
                    }
                    if let Some(c) = as_u64(v) {
                        info.push_os(os_name.clone(), c);
                    }
                }
            }

            processes.push(info);
        }

        if processes.is_empty() {
            return;
        }
        if self.entries.contains_key(&str_repr) {
            warn!(fingerprint = %str_repr, "fingerprint_db.json: duplicate entry, overwriting");
        }
        self.entries.insert(str_repr, FingerprintData::compile(total_count, processes, subnets));
    }

    pub fn get(&self, fingerprint: &str) -> Option<&FingerprintData> {
        self.entries.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

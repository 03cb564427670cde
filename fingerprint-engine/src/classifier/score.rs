//! Naive-Bayes scoring (spec.md section 4.6 "Scoring").
//!
//! Mirrors mercury's `classifier::perform_analysis`: take a fingerprint's
//! compiled prior vector, apply per-feature log-space updates for whichever
//! destination metadata was observed on the flow, exponentiate, normalise,
//! and report the most probable process.

use crate::classifier::db::{FingerprintData, FingerprintDb};
use crate::classifier::ports::remap_port;
use crate::classifier::prevalence::FingerprintPrevalence;

/// `fingerprint_db.json`'s name for a fingerprint with no single process
/// attributed confidently; `perform_analysis` biases away from reporting it
/// when malware is known and a next-best labelled process exists.
const GENERIC_DMZ_PROCESS: &str = "generic dmz process";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    /// The fingerprint string matched an entry in the loaded database.
    Labeled,
    /// Absent from the database but present in the prevalence sets —
    /// commonly seen, attributable to no particular process.
    Randomized,
    /// Absent from both the database and the prevalence sets.
    Unlabeled,
    /// No classification was attempted (analysis disabled, or no
    /// fingerprint string to classify).
    NoInfo,
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    pub process_name: Option<String>,
    pub probability: f64,
    pub os_info: Vec<(String, u64)>,
    pub malware: Option<bool>,
    pub malware_probability: Option<f64>,
}

impl AnalysisResult {
    pub fn no_info() -> Self {
        AnalysisResult {
            status: AnalysisStatus::NoInfo,
            process_name: None,
            probability: 0.0,
            os_info: Vec::new(),
            malware: None,
            malware_probability: None,
        }
    }

    fn unlabeled() -> Self {
        AnalysisResult { status: AnalysisStatus::Unlabeled, ..Self::no_info() }
    }

    fn randomized() -> Self {
        AnalysisResult { status: AnalysisStatus::Randomized, ..Self::no_info() }
    }
}

/// Returns the rightmost two `.`-separated labels of `server_name`, e.g.
/// `"s3.amazonaws.com"` -> `"amazonaws.com"`. A name with no dot is returned
/// unchanged. Mirrors `fingerprint_data::get_tld_domain_name`, which scans
/// left to right remembering only the last two separators seen.
pub fn top_two_domain_labels(server_name: &str) -> &str {
    let mut separator = None;
    let mut previous_separator = None;
    for (i, c) in server_name.char_indices() {
        if c == '.' {
            previous_separator = separator;
            separator = Some(i);
        }
    }
    match previous_separator {
        Some(i) => &server_name[i + 1..],
        None => server_name,
    }
}

/// Run the naive-Bayes classifier for one observed flow.
///
/// `server_name` and `dst_ip` are empty-string-tolerant; an update map with
/// no entry for a feature value simply contributes nothing.
pub fn analyze(
    db: &FingerprintDb,
    prevalence: &FingerprintPrevalence,
    fingerprint: &str,
    server_name: &str,
    dst_ip: std::net::IpAddr,
    dst_port: u16,
) -> AnalysisResult {
    let Some(fp) = db.get(fingerprint) else {
        let seen_before = prevalence.contains(fingerprint);
        prevalence.update(fingerprint);
        if seen_before {
            return AnalysisResult::randomized();
        }
        return AnalysisResult::unlabeled();
    };
    score_fingerprint(fp, db.malware_mode, server_name, dst_ip, dst_port)
}

fn score_fingerprint(
    fp: &FingerprintData,
    malware_mode: bool,
    server_name: &str,
    dst_ip: std::net::IpAddr,
    dst_port: u16,
) -> AnalysisResult {
    let asn = match dst_ip {
        std::net::IpAddr::V4(v4) => fp.subnets.get_asn_info_addr(v4),
        std::net::IpAddr::V6(_) => 0,
    };
    let port_app = remap_port(dst_port);
    let domain = top_two_domain_labels(server_name);
    let dst_ip_str = dst_ip.to_string();

    let mut score: Vec<f64> = fp.process_prior.clone();

    if let Some(updates) = fp.as_updates.get(&asn) {
        for u in updates {
            score[u.index] += u.value;
        }
    }
    if let Some(updates) = fp.port_updates.get(&port_app) {
        for u in updates {
            score[u.index] += u.value;
        }
    }
    if let Some(updates) = fp.domain_updates.get(domain) {
        for u in updates {
            score[u.index] += u.value;
        }
    }
    if let Some(updates) = fp.ip_updates.get(&dst_ip_str) {
        for u in updates {
            score[u.index] += u.value;
        }
    }
    if let Some(updates) = fp.sni_updates.get(server_name) {
        for u in updates {
            score[u.index] += u.value;
        }
    }

    let mut index_max = 0usize;
    let mut index_sec = 0usize;
    let mut max_score = f64::MIN;
    let mut sec_score = f64::MIN;
    for (i, &s) in score.iter().enumerate() {
        if s > max_score {
            sec_score = max_score;
            index_sec = index_max;
            max_score = s;
            index_max = i;
        } else if s > sec_score {
            sec_score = s;
            index_sec = i;
        }
    }

    let mut score_sum = 0.0_f64;
    let mut malware_prob = 0.0_f64;
    for (i, s) in score.iter_mut().enumerate() {
        *s = s.exp();
        score_sum += *s;
        if malware_mode && fp.malware[i] {
            malware_prob += *s;
        }
    }
    let mut max_score = score[index_max];
    let sec_score = score[index_sec];

    // spec.md section 4.6 "generic DMZ rule": when the top process is the
    // unlabelled catch-all and the runner-up is not flagged as malware,
    // report the runner-up instead.
    if malware_mode
        && fp.process_name.get(index_max).map(String::as_str) == Some(GENERIC_DMZ_PROCESS)
        && !fp.malware.get(index_sec).copied().unwrap_or(false)
    {
        index_max = index_sec;
        score_sum -= max_score;
        max_score = sec_score;
    }

    if score_sum > 0.0 {
        max_score /= score_sum;
        if malware_mode {
            malware_prob /= score_sum;
        }
    }

    let os_info = fp.process_os_info.get(index_max).cloned().unwrap_or_default();
    AnalysisResult {
        status: AnalysisStatus::Labeled,
        process_name: fp.process_name.get(index_max).cloned(),
        probability: max_score,
        os_info,
        malware: malware_mode.then(|| fp.malware.get(index_max).copied().unwrap_or(false)),
        malware_probability: malware_mode.then_some(malware_prob),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_two_domain_labels_collapses_subdomains() {
        assert_eq!(top_two_domain_labels("s3.amazonaws.com"), "amazonaws.com");
        assert_eq!(top_two_domain_labels("a.b.c.example.org"), "example.org");
    }

    #[test]
    fn top_two_domain_labels_passes_through_single_label() {
        assert_eq!(top_two_domain_labels("localhost"), "localhost");
        assert_eq!(top_two_domain_labels("example.com"), "example.com");
    }

    #[test]
    fn analyze_unknown_fingerprint_falls_back_to_prevalence() {
        let db = FingerprintDb::new();
        let prevalence = FingerprintPrevalence::new(10);
        prevalence.seed_known("aabbcc");
        let result = analyze(
            &db,
            &prevalence,
            "aabbcc",
            "",
            std::net::IpAddr::V4(std::net::Ipv4Addr::new(1, 2, 3, 4)),
            443,
        );
        assert_eq!(result.status, AnalysisStatus::Randomized);
    }

    #[test]
    fn analyze_unseen_fingerprint_is_not_prevalent() {
        let db = FingerprintDb::new();
        let prevalence = FingerprintPrevalence::new(10);
        let result = analyze(
            &db,
            &prevalence,
            "never-seen",
            "",
            std::net::IpAddr::V4(std::net::Ipv4Addr::new(1, 2, 3, 4)),
            443,
        );
        assert_eq!(result.status, AnalysisStatus::Unlabeled);
    }

    #[test]
    fn analyze_db_hit_picks_highest_scoring_process() {
        use crate::asn::SubnetTable;
        use std::sync::Arc;

        let mut db = FingerprintDb::new();
        let line = r#"{"str_repr":"fp1","total_count":1000,"process_info":[
            {"process":"chrome","count":900,"classes_port_applications":{"https":900}},
            {"process":"curl","count":100,"classes_port_applications":{"https":10}}
        ]}"#;
        db.process_line(line, 0.0, 0.0, false, Arc::new(SubnetTable::new()));
        let prevalence = FingerprintPrevalence::new(10);

        let result = analyze(
            &db,
            &prevalence,
            "fp1",
            "",
            std::net::IpAddr::V4(std::net::Ipv4Addr::new(1, 2, 3, 4)),
            443,
        );
        assert_eq!(result.status, AnalysisStatus::Labeled);
        assert_eq!(result.process_name.as_deref(), Some("chrome"));
        assert!(result.probability > 0.0 && result.probability <= 1.0);
    }
}

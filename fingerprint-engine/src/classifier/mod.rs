//! Fingerprint classification: database loading, prevalence tracking, and
//! naive-Bayes scoring (spec.md section 4.6).

pub mod db;
pub mod ports;
pub mod prevalence;
pub mod process_info;
pub mod score;

pub use db::{FingerprintData, FingerprintDb, Update};
pub use prevalence::FingerprintPrevalence;
pub use process_info::ProcessInfo;
pub use score::{analyze, top_two_domain_labels, AnalysisResult, AnalysisStatus};

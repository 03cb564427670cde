//! Classifier retention thresholds (spec.md section 4.6 "Process
//! retention"), loaded once at startup and handed to
//! [`crate::classifier::FingerprintDb::process_line`].

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ThresholdsConfig {
    /// Minimum `count / total_count` fraction for a fingerprint's third+
    /// process entry to be retained.
    #[serde(default = "default_fp_proc_threshold")]
    pub fp_proc_threshold: f64,
    /// Minimum fraction of a process's traffic directed at a destination
    /// class (domain, AS, IP, SNI) for that class to be retained.
    #[serde(default = "default_proc_dst_threshold")]
    pub proc_dst_threshold: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        ThresholdsConfig {
            fp_proc_threshold: default_fp_proc_threshold(),
            proc_dst_threshold: default_proc_dst_threshold(),
        }
    }
}

impl ThresholdsConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, v) in [
            ("fp_proc_threshold", self.fp_proc_threshold),
            ("proc_dst_threshold", self.proc_dst_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("{name} must be in [0, 1], got {v}"));
            }
        }
        Ok(())
    }
}

fn default_fp_proc_threshold() -> f64 {
    0.01
}

fn default_proc_dst_threshold() -> f64 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_within_range() {
        ThresholdsConfig::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let cfg = ThresholdsConfig { fp_proc_threshold: 1.5, proc_dst_threshold: 0.5 };
        assert!(cfg.validate().is_err());
    }
}

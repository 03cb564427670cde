//! Output-shaping toggles (spec.md section 6) read directly into
//! [`crate::processor::ProcessorConfig`] plus the supplemented stats
//! counters (section 10).

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct OutputConfig {
    #[serde(default)]
    pub dns_json_output: bool,
    #[serde(default)]
    pub certs_json_output: bool,
    #[serde(default = "default_true")]
    pub metadata_output: bool,
    #[serde(default = "default_true")]
    pub do_analysis: bool,
    #[serde(default = "default_true")]
    pub do_stats: bool,
    #[serde(default)]
    pub report_os: bool,
    #[serde(default)]
    pub output_tcp_initial_data: bool,
    #[serde(default)]
    pub output_udp_initial_data: bool,
    #[serde(default = "default_max_stats_entries")]
    pub max_stats_entries: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            dns_json_output: false,
            certs_json_output: false,
            metadata_output: default_true(),
            do_analysis: default_true(),
            do_stats: default_true(),
            report_os: false,
            output_tcp_initial_data: false,
            output_udp_initial_data: false,
            max_stats_entries: default_max_stats_entries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_stats_entries() -> usize {
    10_000
}

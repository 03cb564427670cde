use serde::Deserialize;

use super::filter::FilterConfig;
use super::output::OutputConfig;
use super::resources::ResourcesConfig;
use super::thresholds::ThresholdsConfig;

/// Top-level configuration (spec.md section 6 "Configuration"), loaded from
/// a TOML file with [`super::loader::load_from_path`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(flatten)]
    pub resources: ResourcesConfig,
    #[serde(flatten)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

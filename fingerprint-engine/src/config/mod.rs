//! Configuration (spec.md section 6 "Configuration"): a `toml`-backed
//! `Config` struct, validated once at init and never consulted on the
//! per-packet path.

mod filter;
mod loader;
mod output;
mod resources;
mod root;
mod thresholds;

pub use filter::FilterConfig;
pub use loader::load_from_path;
pub use output::OutputConfig;
pub use resources::{KeyType, ResourcesConfig};
pub use root::Config;
pub use thresholds::ThresholdsConfig;

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{EngineError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)?;
    let cfg: Config = toml::from_str(&txt).map_err(|e| EngineError::Config(e.to_string()))?;
    validate_config(&cfg)?;
    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.resources.resources.trim().is_empty() {
        return Err(EngineError::Config("resources path must not be empty".to_string()));
    }
    cfg.resources.decoded_key().map_err(EngineError::Config)?;
    cfg.filter.compile().map_err(EngineError::Config)?;
    cfg.thresholds.validate().map_err(EngineError::Config)?;
    Ok(())
}

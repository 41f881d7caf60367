// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawSchedulerConfig, SchedulerConfig};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated model.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSchedulerConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

/// Parse configuration from TOML text without validating it.
pub fn load_from_str(contents: &str) -> Result<RawSchedulerConfig> {
    let config: RawSchedulerConfig = toml::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// This is the recommended entry point: it reads TOML, applies defaults
/// (handled by `serde` + `Default` impls) and rejects values the executors
/// cannot run with.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SchedulerConfig> {
    let raw = load_from_path(path)?;
    SchedulerConfig::try_from(raw)
}

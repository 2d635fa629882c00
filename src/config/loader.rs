// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a plan file and return the raw, unvalidated `RawConfigFile`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), operations = config.operation.len(), "plan file parsed");

    Ok(config)
}

/// Load a plan file and validate it:
///
/// - at least one operation,
/// - `max_concurrent_operations >= 1` when given,
/// - no unknown or self references in `after`,
/// - no dependency cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `Plan.toml` in the current working directory.
pub fn default_plan_path() -> PathBuf {
    PathBuf::from("Plan.toml")
}

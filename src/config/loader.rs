// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{MissionConfig, RawMissionConfig};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated model.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] to also
/// parse durations and check value ranges.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawMissionConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawMissionConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file and validate it into a [`MissionConfig`].
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<MissionConfig> {
    let raw = load_from_path(path)?;
    MissionConfig::try_from(raw)
}

/// Default location: `missiondag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("missiondag.toml")
}

// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated `RawConfigFile`.
///
/// Use [`load_and_validate`] when no further overrides are applied.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Like [`load_from_path`], but a missing file yields the defaults.
///
/// Used for the implicit default path; an explicitly requested file should
/// go through [`load_from_path`] so that a typo is reported.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(RawConfigFile::default());
    }
    load_from_path(path)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Config file looked up when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("TaskStatus.toml")
}

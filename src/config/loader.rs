// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run basic validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - empty interpreter programs,
///   - unparseable `grace_period`,
///   - unknown interrupt signal names.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load the config at `path`, or fall back to built-in defaults when the file
/// does not exist and the caller did not insist on it.
pub fn load_or_default(path: impl AsRef<Path>, required: bool) -> Result<ConfigFile> {
    let path = path.as_ref();
    if !required && !path.exists() {
        tracing::debug!(path = %path.display(), "config file absent; using defaults");
        return ConfigFile::try_from(RawConfigFile::default());
    }
    load_and_validate(path)
}

/// Default config location: `Kernelgate.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Kernelgate.toml")
}

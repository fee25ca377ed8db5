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

/// Parse configuration from an in-memory TOML string and validate it.
pub fn parse_and_validate(contents: &str) -> Result<ConfigFile> {
    let raw: RawConfigFile = toml::from_str(contents)?;
    ConfigFile::try_from(raw)
}

/// Load a configuration file from path and run basic validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks for:
///   - an absolute `allowed_root`,
///   - non-zero buffer sizes,
///   - non-empty tool names.
///
/// A relative `document` path is resolved against the config file's
/// directory.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let mut config = ConfigFile::try_from(raw_config)?;

    if config.document.is_relative() {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            config.document = dir.join(&config.document);
        }
    }

    Ok(config)
}

/// Helper to resolve a default config path.
///
/// `NASJOBS_CONFIG` wins if set; otherwise `Nasjobs.toml` in the current
/// working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("NASJOBS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Nasjobs.toml"))
}

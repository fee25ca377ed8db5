// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{NasJobsError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::NasJobsError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.engine, raw.tools))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_engine_section(cfg)?;
    validate_tools(cfg)?;
    Ok(())
}

fn validate_engine_section(cfg: &RawConfigFile) -> Result<()> {
    let engine = &cfg.engine;

    if engine.allowed_root.as_os_str().is_empty() {
        return Err(NasJobsError::ConfigError(
            "[engine].allowed_root must not be empty".to_string(),
        ));
    }
    if !engine.allowed_root.is_absolute() {
        return Err(NasJobsError::ConfigError(format!(
            "[engine].allowed_root must be an absolute path (got {:?})",
            engine.allowed_root
        )));
    }
    if engine.document.as_os_str().is_empty() {
        return Err(NasJobsError::ConfigError(
            "[engine].document must not be empty".to_string(),
        ));
    }

    if engine.live_buffer_bytes == 0 {
        return Err(NasJobsError::ConfigError(
            "[engine].live_buffer_bytes must be >= 1 (got 0)".to_string(),
        ));
    }
    if engine.history_output_bytes == 0 {
        return Err(NasJobsError::ConfigError(
            "[engine].history_output_bytes must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_tools(cfg: &RawConfigFile) -> Result<()> {
    let tools = &cfg.tools;
    for (key, value) in [
        ("rsync", &tools.rsync),
        ("tar", &tools.tar),
        ("rclone", &tools.rclone),
    ] {
        if value.trim().is_empty() {
            return Err(NasJobsError::ConfigError(format!(
                "[tools].{key} must not be empty"
            )));
        }
    }
    Ok(())
}

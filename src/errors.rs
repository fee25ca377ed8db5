// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only failures the caller can act on synchronously live here. Whatever
//! happens to a process after it has started is recorded in job history
//! instead (see [`crate::job::HistoryEntry`]).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NasJobsError {
    /// Bad path, kind, cron expression, retention or exclude pattern.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Run requested while already running, or delete requested while running.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Signal delivery failed: {0}")]
    SignalDelivery(String),

    #[error("Job store is no longer running")]
    StoreClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NasJobsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        NasJobsError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        NasJobsError::Conflict(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, NasJobsError>;

// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::exec::output::{DEFAULT_HISTORY_OUTPUT_BYTES, DEFAULT_LIVE_BUFFER_BYTES};
use crate::exec::{OutputLimits, ToolPaths};

/// Configuration exactly as read from `Nasjobs.toml`.
///
/// ```toml
/// [engine]
/// allowed_root = "/mnt/storage"
/// document = "/var/lib/nasjobs/config.json"
/// live_buffer_bytes = 10240
/// history_output_bytes = 5120
///
/// [tools]
/// rsync = "/usr/bin/rsync"
/// tar = "tar"
/// rclone = "rclone"
/// ```
///
/// `[engine].allowed_root` is required; everything else has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    pub engine: EngineSection,

    #[serde(default)]
    pub tools: ToolPaths,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Every local source and destination must resolve inside this directory.
    pub allowed_root: PathBuf,

    /// JSON document holding the job list (under `backupJobs`).
    #[serde(default = "default_document")]
    pub document: PathBuf,

    #[serde(default = "default_live_buffer_bytes")]
    pub live_buffer_bytes: usize,

    #[serde(default = "default_history_output_bytes")]
    pub history_output_bytes: usize,
}

fn default_document() -> PathBuf {
    PathBuf::from("nasjobs.json")
}

fn default_live_buffer_bytes() -> usize {
    DEFAULT_LIVE_BUFFER_BYTES
}

fn default_history_output_bytes() -> usize {
    DEFAULT_HISTORY_OUTPUT_BYTES
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub allowed_root: PathBuf,
    pub document: PathBuf,
    pub output: OutputLimits,
    pub tools: ToolPaths,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(engine: EngineSection, tools: ToolPaths) -> Self {
        Self {
            allowed_root: engine.allowed_root,
            document: engine.document,
            output: OutputLimits {
                live_bytes: engine.live_buffer_bytes,
                history_bytes: engine.history_output_bytes,
            },
            tools,
        }
    }

    /// Build a configuration in code, with default limits and tool names.
    pub fn new(allowed_root: impl Into<PathBuf>, document: impl Into<PathBuf>) -> Self {
        Self {
            allowed_root: allowed_root.into(),
            document: document.into(),
            output: OutputLimits::default(),
            tools: ToolPaths::default(),
        }
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_output(mut self, output: OutputLimits) -> Self {
        self.output = output;
        self
    }
}

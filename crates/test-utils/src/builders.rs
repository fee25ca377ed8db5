#![allow(dead_code)]

use std::path::{Path, PathBuf};

use nasjobs::config::ConfigFile;
use nasjobs::exec::{OutputLimits, ToolPaths};
use nasjobs::job::{JobSpec, Retention, Schedule};
use nasjobs::types::JobKind;

/// Builder for `JobSpec` to simplify test setup.
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    /// A local-mirror job with no schedule, no excludes and default retention.
    pub fn new(name: &str, source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Self {
        Self {
            spec: JobSpec {
                name: name.to_string(),
                source: source.as_ref().display().to_string(),
                destination: destination.as_ref().display().to_string(),
                kind: JobKind::LocalMirror,
                schedule: Schedule::default(),
                excludes: vec![],
                retention: Retention::default(),
            },
        }
    }

    pub fn kind(mut self, kind: JobKind) -> Self {
        self.spec.kind = kind;
        self
    }

    /// Raw destination string, e.g. `remote:bucket/path`.
    pub fn destination(mut self, destination: &str) -> Self {
        self.spec.destination = destination.to_string();
        self
    }

    pub fn cron(mut self, expr: &str) -> Self {
        self.spec.schedule = Schedule {
            enabled: true,
            cron: expr.to_string(),
        };
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.spec.excludes.push(pattern.to_string());
        self
    }

    pub fn keep_last(mut self, keep_last: u32) -> Self {
        self.spec.retention = Retention { keep_last };
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: ConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(allowed_root: impl Into<PathBuf>, document: impl Into<PathBuf>) -> Self {
        Self {
            config: ConfigFile::new(allowed_root, document),
        }
    }

    /// Use the same executable for every job kind.
    pub fn all_tools(mut self, program: &str) -> Self {
        self.config.tools = ToolPaths {
            rsync: program.to_string(),
            tar: program.to_string(),
            rclone: program.to_string(),
        };
        self
    }

    pub fn live_buffer_bytes(mut self, bytes: usize) -> Self {
        self.config.output.live_bytes = bytes;
        self
    }

    pub fn history_output_bytes(mut self, bytes: usize) -> Self {
        self.config.output.history_bytes = bytes;
        self
    }

    pub fn output(mut self, output: OutputLimits) -> Self {
        self.config.output = output;
        self
    }

    pub fn build(self) -> ConfigFile {
        self.config
    }
}

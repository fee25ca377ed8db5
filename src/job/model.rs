// src/job/model.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{JobKind, LastResult, RunStatus};

pub const DEFAULT_KEEP_LAST: u32 = 10;

/// When the external scheduler should fire a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default)]
    pub enabled: bool,
    /// 5-field crontab expression; may be empty while `enabled` is false.
    #[serde(default)]
    pub cron: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    pub keep_last: u32,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            keep_last: DEFAULT_KEEP_LAST,
        }
    }
}

/// The three fields that decide what a process actually touches.
///
/// A copy is stored on every history entry so that a run interrupted by a
/// crash can be validated and relaunched exactly as it was started, even if
/// the job has been edited since.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub source: String,
    pub destination: String,
    pub kind: JobKind,
}

/// Input for `create_job`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub name: String,
    pub source: String,
    pub destination: String,
    pub kind: JobKind,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub retention: Retention,
}

/// Partial update for `update_job`; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    pub name: Option<String>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub kind: Option<JobKind>,
    pub schedule: Option<Schedule>,
    pub excludes: Option<Vec<String>>,
    pub retention: Option<Retention>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        self == &JobPatch::default()
    }
}

/// One recorded execution of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Execution id.
    pub id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Tail of the captured stdout/stderr.
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, flatten)]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_as: Option<String>,
}

impl HistoryEntry {
    /// Entry persisted when a process has been started.
    pub fn running(
        id: impl Into<String>,
        target: Target,
        started_at: DateTime<Utc>,
        resumed_from: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status: RunStatus::Running,
            started_at,
            finished_at: None,
            success: false,
            exit_code: None,
            output: String::new(),
            error: None,
            target: Some(target),
            resumed_from,
            resumed_as: None,
        }
    }

    /// Terminal copy of this entry.
    ///
    /// Success means exit code 0 and no error. A failure always ends up with
    /// either a non-zero exit code or an error string.
    pub fn finish(
        &self,
        finished_at: DateTime<Utc>,
        exit_code: Option<i32>,
        error: Option<String>,
        output: String,
    ) -> Self {
        let success = exit_code == Some(0) && error.is_none();
        let error = match error {
            None if !success && exit_code.is_none() => {
                Some("process ended without an exit code".to_string())
            }
            other => other,
        };

        Self {
            status: if success {
                RunStatus::Success
            } else {
                RunStatus::Failed
            },
            finished_at: Some(finished_at),
            success,
            exit_code,
            output,
            error,
            ..self.clone()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

/// A persisted job definition plus its bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub name: String,
    pub source: String,
    pub destination: String,
    pub kind: JobKind,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub retention: Retention,
    /// Newest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_result: LastResult,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn from_spec(spec: JobSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: spec.name.trim().to_string(),
            source: spec.source,
            destination: spec.destination,
            kind: spec.kind,
            schedule: spec.schedule,
            excludes: spec.excludes,
            retention: spec.retention,
            history: Vec::new(),
            last_run: None,
            last_result: LastResult::None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn spec(&self) -> JobSpec {
        JobSpec {
            name: self.name.clone(),
            source: self.source.clone(),
            destination: self.destination.clone(),
            kind: self.kind,
            schedule: self.schedule.clone(),
            excludes: self.excludes.clone(),
            retention: self.retention,
        }
    }

    pub fn target(&self) -> Target {
        Target {
            source: self.source.clone(),
            destination: self.destination.clone(),
            kind: self.kind,
        }
    }

    pub fn apply_patch(&mut self, patch: JobPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(source) = patch.source {
            self.source = source;
        }
        if let Some(destination) = patch.destination {
            self.destination = destination;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(schedule) = patch.schedule {
            self.schedule = schedule;
        }
        if let Some(excludes) = patch.excludes {
            self.excludes = excludes;
        }
        if let Some(retention) = patch.retention {
            self.retention = retention;
        }
        self.updated_at = Some(now);
    }

    pub fn history_entry(&self, execution_id: &str) -> Option<&HistoryEntry> {
        self.history.iter().find(|e| e.id == execution_id)
    }

    pub fn history_entry_mut(&mut self, execution_id: &str) -> Option<&mut HistoryEntry> {
        self.history.iter_mut().find(|e| e.id == execution_id)
    }

    /// Re-derive `last_run` / `last_result` from the head of the history.
    ///
    /// A `running` or `resumed` head leaves the previous summary in place:
    /// neither says anything about how an execution ended.
    pub fn refresh_summary(&mut self) {
        let Some(head) = self.history.first() else {
            return;
        };
        let result = match head.status {
            RunStatus::Success => LastResult::Success,
            RunStatus::Failed => LastResult::Failed,
            RunStatus::Running | RunStatus::Resumed => return,
        };
        self.last_result = result;
        self.last_run = Some(head.finished_at.unwrap_or(head.started_at));
    }
}

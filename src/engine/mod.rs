// src/engine/mod.rs

//! Job execution engine.
//!
//! This module ties together:
//! - the persisted job store
//! - the running table (which jobs currently own a live process)
//! - the runner that spawns, supervises and finalizes processes
//! - crash recovery at startup
//!
//! The pure bookkeeping lives in [`table`]; the async/IO shell is
//! implemented in [`runner`]. [`Engine`] is the surface callers use.

pub mod recovery;
pub mod runner;
pub mod table;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::ConfigFile;
use crate::errors::{NasJobsError, Result};
use crate::exec::ProcessSpawner;
use crate::fs::FileSystem;
use crate::guard::PathValidator;
use crate::job::{HistoryEntry, Job, JobPatch, JobSpec, JobValidator};
use crate::store::JobStore;
use crate::types::LastResult;

pub use recovery::{AbandonedExecution, RecoveryManager, RecoveryReport, ResumedExecution};
pub use runner::{DeleteGuard, JobRunner, RunHandle, RunOutcome, RunRequest};
pub use table::{RunTable, RunningJobRecord};

/// What `status` reports for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum JobStatus {
    /// Never ran.
    Idle,
    #[serde(rename_all = "camelCase")]
    Running {
        execution_id: String,
        started_at: DateTime<Utc>,
        pid: Option<u32>,
        /// Tail of the live output buffer.
        output: String,
        /// Everything read so far, including bytes no longer buffered.
        output_bytes: u64,
    },
    #[serde(rename_all = "camelCase")]
    Terminal {
        last_result: LastResult,
        last_run: Option<DateTime<Utc>>,
    },
}

impl JobStatus {
    pub fn from_job(job: &Job) -> Self {
        match job.last_result {
            LastResult::None => JobStatus::Idle,
            result => JobStatus::Terminal {
                last_result: result,
                last_run: job.last_run,
            },
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Running { .. })
    }
}

/// Result of `stop`; neither variant is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum StopOutcome {
    NotRunning,
    #[serde(rename_all = "camelCase")]
    Stopped {
        execution_id: String,
        /// False when the signal could not be sent (e.g. already exited).
        signal_delivered: bool,
    },
}

/// Store, runner and recovery wired to one configuration.
#[derive(Debug, Clone)]
pub struct Engine {
    store: JobStore,
    runner: JobRunner,
    validator: JobValidator,
}

impl Engine {
    pub async fn open(
        cfg: &ConfigFile,
        fs: Arc<dyn FileSystem>,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Result<Self> {
        let paths = PathValidator::new(cfg.allowed_root.clone(), Arc::clone(&fs));
        let validator = JobValidator::new(paths);
        let store = JobStore::open(cfg.document.clone(), fs, validator.clone()).await?;
        let runner = JobRunner::new(store.clone(), spawner, cfg.tools.clone(), cfg.output);

        info!(
            root = ?cfg.allowed_root,
            document = ?cfg.document,
            "engine ready"
        );

        Ok(Self {
            store,
            runner,
            validator,
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn validator(&self) -> &JobValidator {
        &self.validator
    }

    pub async fn create_job(&self, spec: JobSpec) -> Result<Job> {
        self.store.create_job(spec).await
    }

    pub async fn update_job(&self, id: &str, patch: JobPatch) -> Result<Job> {
        self.store.update_job(id, patch).await
    }

    /// Delete a job that is not running, here or in another process. Runs
    /// are refused until it is gone.
    pub async fn delete_job(&self, id: &str) -> Result<Job> {
        let _guard = self.runner.guard_delete(id)?;
        let _run_lock = self.store.run_locks().try_acquire(id).await?.ok_or_else(|| {
            NasJobsError::conflict(format!(
                "job '{id}' is running in another nasjobs process; stop it first"
            ))
        })?;
        self.store.delete_job(id).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.store.list_jobs().await
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        self.store.get_job(id).await
    }

    pub async fn run(&self, id: &str) -> Result<RunOutcome> {
        self.runner.run(id).await
    }

    pub fn stop(&self, id: &str) -> StopOutcome {
        self.runner.stop(id)
    }

    pub async fn status(&self, id: &str) -> Result<JobStatus> {
        self.runner.status(id).await
    }

    pub async fn history(&self, id: &str) -> Result<Vec<HistoryEntry>> {
        self.store.history(id).await
    }

    /// Resolve entries left `running` by a previous instance. Call once,
    /// before accepting other requests.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        RecoveryManager::new(
            self.store.clone(),
            self.runner.clone(),
            self.validator.clone(),
        )
        .recover()
        .await
    }
}

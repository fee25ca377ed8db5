// src/engine/runner.rs

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::{NasJobsError, Result};
use crate::exec::{
    build_invocation, drive, OutputCapture, OutputLimits, ProcessSpawner, SharedOutput,
    SpawnedProcess, ToolPaths,
};
use crate::fs::FileLock;
use crate::job::{HistoryEntry, Target};
use crate::store::JobStore;

use super::table::{RunTable, RunningJobRecord};
use super::{JobStatus, StopOutcome};

/// What to launch for a `run` call.
#[derive(Debug)]
pub struct RunRequest {
    pub execution_id: String,
    /// Execution this one continues after a crash.
    pub resumed_from: Option<String>,
    /// Override for the job's current source/destination/kind.
    pub target: Option<Target>,
    /// Run lock the caller already holds; taken here otherwise.
    pub run_lock: Option<FileLock>,
}

impl RunRequest {
    pub fn fresh() -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            resumed_from: None,
            target: None,
            run_lock: None,
        }
    }

    /// Relaunch of `original`, using the target it was started with.
    pub fn resume(original: impl Into<String>, target: Target) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            resumed_from: Some(original.into()),
            target: Some(target),
            run_lock: None,
        }
    }

    pub fn with_run_lock(mut self, lock: FileLock) -> Self {
        self.run_lock = Some(lock);
        self
    }
}

/// Handle to a started execution; completes after history has been written.
#[derive(Debug)]
pub struct RunHandle {
    pub job_id: String,
    pub execution_id: String,
    pub pid: Option<u32>,
    task: JoinHandle<HistoryEntry>,
}

impl RunHandle {
    /// Wait for the process to exit and its entry to be recorded.
    pub async fn wait(self) -> Result<HistoryEntry> {
        self.task
            .await
            .map_err(|e| NasJobsError::Other(anyhow!("supervisor task for job '{}' failed: {e}", self.job_id)))
    }
}

/// Result of a `run` call that got past validation and the conflict check.
#[derive(Debug)]
pub enum RunOutcome {
    Started(RunHandle),
    /// The tool could not be started; this failed entry is already recorded.
    SpawnFailed(HistoryEntry),
}

impl RunOutcome {
    pub fn execution_id(&self) -> &str {
        match self {
            RunOutcome::Started(handle) => &handle.execution_id,
            RunOutcome::SpawnFailed(entry) => &entry.id,
        }
    }
}

/// Owns the running table and launches processes for jobs.
///
/// Cloning is cheap; every clone shares the same table.
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    store: JobStore,
    spawner: Arc<dyn ProcessSpawner>,
    tools: ToolPaths,
    limits: OutputLimits,
    table: Mutex<RunTable>,
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("tools", &self.inner.tools)
            .field("limits", &self.inner.limits)
            .field("running", &self.inner.table.lock().running_count())
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        store: JobStore,
        spawner: Arc<dyn ProcessSpawner>,
        tools: ToolPaths,
        limits: OutputLimits,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                store,
                spawner,
                tools,
                limits,
                table: Mutex::new(RunTable::new()),
            }),
        }
    }

    pub async fn run(&self, job_id: &str) -> Result<RunOutcome> {
        self.run_with(job_id, RunRequest::fresh()).await
    }

    /// Start an execution of `job_id`.
    ///
    /// Errors are returned for an unknown job, a conflict (running here or in
    /// another process) or a run lock that cannot be taken; anything that
    /// goes wrong once the job is claimed ends up in its history.
    ///
    /// Dropping the returned future never strands the job: before the process
    /// exists the reservation is released, and after that the supervisor task
    /// owns it.
    pub async fn run_with(&self, job_id: &str, mut request: RunRequest) -> Result<RunOutcome> {
        let job = self.inner.store.require_job(job_id).await?;
        let target = request.target.clone().unwrap_or_else(|| job.target());
        let started_at = Utc::now();
        let capture = OutputCapture::shared(self.inner.limits);

        // Check and insert under one lock; nothing here may await.
        self.inner
            .table
            .lock()
            .try_reserve(RunningJobRecord::new(
                job_id,
                &request.execution_id,
                started_at,
                capture.clone(),
            ))
            .map_err(NasJobsError::Conflict)?;
        let reservation = Reservation {
            runner: self.clone(),
            job_id: job_id.to_string(),
            execution_id: request.execution_id.clone(),
        };

        let run_lock = match request.run_lock.take() {
            Some(lock) => lock,
            None => self
                .inner
                .store
                .run_locks()
                .try_acquire(job_id)
                .await?
                .ok_or_else(|| {
                    NasJobsError::conflict(format!(
                        "job '{job_id}' is already running in another nasjobs process"
                    ))
                })?,
        };

        let running = HistoryEntry::running(
            &request.execution_id,
            target.clone(),
            started_at,
            request.resumed_from.clone(),
        );
        let invocation =
            build_invocation(&target, &job.excludes, &job.name, &self.inner.tools, started_at);

        info!(
            job = %job_id,
            execution = %request.execution_id,
            resumed_from = ?request.resumed_from,
            cmd = %invocation,
            "starting job process"
        );

        let process = match self.inner.spawner.spawn(&invocation) {
            Ok(process) => process,
            Err(e) => {
                let entry = running.finish(
                    Utc::now(),
                    None,
                    Some(format!("failed to start '{}': {e}", invocation.program)),
                    String::new(),
                );
                warn!(
                    job = %job_id,
                    execution = %entry.id,
                    error = %e,
                    "job process could not be started"
                );
                drop(reservation);
                self.record(job_id, entry.clone()).await;
                drop(run_lock);
                return Ok(RunOutcome::SpawnFailed(entry));
            }
        };

        let attached = self.inner.table.lock().attach(
            job_id,
            &request.execution_id,
            process.pid,
            Arc::clone(&process.signaller),
        );
        if !attached {
            // A stop arrived between reservation and spawn.
            info!(job = %job_id, execution = %request.execution_id, "stop requested during spawn; terminating");
            if let Err(e) = process.signaller.terminate() {
                warn!(job = %job_id, error = %e, "failed to terminate freshly spawned process");
            }
        }

        // From here on the task owns the process, the reservation and the
        // run lock, so the caller going away cannot leave them behind.
        let pid = process.pid;
        let (persisted_tx, persisted_rx) = oneshot::channel();
        let task = tokio::spawn(self.clone().supervise(Supervised {
            reservation,
            run_lock,
            running,
            process,
            capture,
            persisted: persisted_tx,
        }));

        // Only report the start once its `running` entry is on disk.
        let _ = persisted_rx.await;

        Ok(RunOutcome::Started(RunHandle {
            job_id: job_id.to_string(),
            execution_id: request.execution_id,
            pid,
            task,
        }))
    }

    /// Persist the `running` entry, wait for exit, clear the record if it is
    /// still ours, record the outcome.
    async fn supervise(self, run: Supervised) -> HistoryEntry {
        let Supervised {
            reservation,
            run_lock,
            running,
            process,
            capture,
            persisted,
        } = run;
        let job_id = reservation.job_id.clone();

        self.record(&job_id, running.clone()).await;
        let _ = persisted.send(());

        let completion = drive(&job_id, process.exit, process.stdout, process.stderr, &capture).await;

        if !reservation.release() {
            debug!(job = %job_id, execution = %running.id, "record already cleared by stop");
        }

        let output = capture.lock().tail.to_string_lossy();
        let entry = running.finish(Utc::now(), completion.exit_code, completion.error, output);

        info!(
            job = %job_id,
            execution = %entry.id,
            exit_code = ?entry.exit_code,
            success = entry.success,
            "job process exited"
        );

        self.record(&job_id, entry.clone()).await;
        drop(run_lock);
        entry
    }

    /// `add_history` that never fails the caller; problems are logged.
    async fn record(&self, job_id: &str, entry: HistoryEntry) {
        let execution = entry.id.clone();
        match self.inner.store.add_history(job_id, entry).await {
            Ok(true) => {}
            Ok(false) => warn!(
                job = %job_id,
                execution = %execution,
                "history not recorded: job was deleted while running"
            ),
            Err(e) => error!(
                job = %job_id,
                execution = %execution,
                error = %e,
                "failed to record history entry"
            ),
        }
    }

    /// Request termination of the job's process.
    ///
    /// The record is cleared immediately; the process's own exit still
    /// writes the final history entry when it happens. Cancellation is
    /// advisory: there is no escalation if the process ignores SIGTERM.
    pub fn stop(&self, job_id: &str) -> StopOutcome {
        let Some(record) = self.inner.table.lock().take(job_id) else {
            debug!(job = %job_id, "stop requested but job is not running");
            return StopOutcome::NotRunning;
        };

        let signal_delivered = match record.signaller() {
            Some(signaller) => match signaller.terminate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        job = %job_id,
                        execution = %record.execution_id,
                        error = %e,
                        "could not signal job process; treating as stopped"
                    );
                    false
                }
            },
            None => {
                // Spawn still in progress; `run_with` will see the cleared
                // reservation and terminate the process itself.
                false
            }
        };

        info!(job = %job_id, execution = %record.execution_id, signal_delivered, "job stopped");
        StopOutcome::Stopped {
            execution_id: record.execution_id,
            signal_delivered,
        }
    }

    /// Live status if running, otherwise the stored summary.
    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        if let Some(status) = self.live_status(job_id) {
            return Ok(status);
        }
        let job = self.inner.store.require_job(job_id).await?;
        Ok(JobStatus::from_job(&job))
    }

    fn live_status(&self, job_id: &str) -> Option<JobStatus> {
        let table = self.inner.table.lock();
        let record = table.get(job_id)?;
        let capture = record.output.lock();
        Some(JobStatus::Running {
            execution_id: record.execution_id.clone(),
            started_at: record.started_at,
            pid: record.pid,
            output: capture.live.to_string_lossy(),
            output_bytes: capture.total_bytes,
        })
    }

    /// Size of the live buffer right now, without copying it.
    pub fn live_output_len(&self, job_id: &str) -> Option<usize> {
        let table = self.inner.table.lock();
        table.get(job_id).map(|r| r.output.lock().live.len())
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.inner.table.lock().is_running(job_id)
    }

    pub fn is_tracking(&self, job_id: &str, execution_id: &str) -> bool {
        self.inner.table.lock().is_tracking(job_id, execution_id)
    }

    pub fn running(&self) -> Vec<RunningJobRecord> {
        self.inner.table.lock().running()
    }

    /// Block runs of `job_id` until the guard is dropped; fails if running.
    pub fn guard_delete(&self, job_id: &str) -> Result<DeleteGuard> {
        self.inner
            .table
            .lock()
            .begin_delete(job_id)
            .map_err(NasJobsError::Conflict)?;
        Ok(DeleteGuard {
            runner: self.clone(),
            job_id: job_id.to_string(),
        })
    }
}

/// Everything the supervisor task takes over from `run_with`.
struct Supervised {
    reservation: Reservation,
    run_lock: FileLock,
    running: HistoryEntry,
    process: SpawnedProcess,
    capture: SharedOutput,
    persisted: oneshot::Sender<()>,
}

/// A claimed slot in the run table, released on drop. Releasing is matched
/// on the execution id, so a later run of the same job is never touched.
struct Reservation {
    runner: JobRunner,
    job_id: String,
    execution_id: String,
}

impl Reservation {
    /// Release now; false if a stop already cleared the record.
    fn release(self) -> bool {
        self.runner
            .inner
            .table
            .lock()
            .release(&self.job_id, &self.execution_id)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.runner
            .inner
            .table
            .lock()
            .release(&self.job_id, &self.execution_id);
    }
}

/// Keeps a job from being started while its deletion is in flight.
pub struct DeleteGuard {
    runner: JobRunner,
    job_id: String,
}

impl Drop for DeleteGuard {
    fn drop(&mut self) {
        self.runner.inner.table.lock().end_delete(&self.job_id);
    }
}

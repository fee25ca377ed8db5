// src/engine/recovery.rs

//! Startup pass over persisted history.
//!
//! A history entry still marked `running` when the engine boots belongs to a
//! process that died with the previous instance, unless another `nasjobs`
//! process still holds the job's run lock. Each stale one is either
//! relaunched (with `resumedFrom` / `resumedAs` linking old and new) or
//! marked failed if its stored target no longer validates.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::errors::{NasJobsError, Result};
use crate::fs::FileLock;
use crate::job::{HistoryEntry, Job, JobValidator};
use crate::store::{EntryRewrite, JobStore};

use super::runner::{JobRunner, RunOutcome, RunRequest};

/// A stale entry that was relaunched.
#[derive(Debug)]
pub struct ResumedExecution {
    pub job_id: String,
    pub original_execution_id: String,
    pub outcome: RunOutcome,
}

/// A stale entry that was closed out as failed instead of relaunched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedExecution {
    pub job_id: String,
    pub execution_id: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub resumed: Vec<ResumedExecution>,
    pub failed: Vec<AbandonedExecution>,
    /// Jobs left alone because another process is still running them.
    pub live_elsewhere: Vec<String>,
    /// Per-entry problems that were logged and skipped.
    pub errors: Vec<String>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.resumed.is_empty()
            && self.failed.is_empty()
            && self.live_elsewhere.is_empty()
            && self.errors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryManager {
    store: JobStore,
    runner: JobRunner,
    validator: JobValidator,
}

impl RecoveryManager {
    pub fn new(store: JobStore, runner: JobRunner, validator: JobValidator) -> Self {
        Self {
            store,
            runner,
            validator,
        }
    }

    /// Close out or relaunch every stale `running` entry.
    ///
    /// Only a failure to list the jobs is returned as an error; problems
    /// with a single entry are logged and collected in the report.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let jobs = self.store.list_jobs().await?;
        let mut report = RecoveryReport::default();

        for job in &jobs {
            self.recover_job(job, &mut report).await;
        }

        info!(
            resumed = report.resumed.len(),
            failed = report.failed.len(),
            live_elsewhere = report.live_elsewhere.len(),
            errors = report.errors.len(),
            "recovery finished"
        );
        Ok(report)
    }

    async fn recover_job(&self, job: &Job, report: &mut RecoveryReport) {
        // Newest first, same as the history itself.
        let stale: Vec<&HistoryEntry> = job
            .history
            .iter()
            .filter(|e| e.is_running() && !self.runner.is_tracking(&job.id, &e.id))
            .collect();

        let Some((newest, older)) = stale.split_first() else {
            return;
        };

        // A live run of ours supersedes every leftover.
        if let Some(live) = self.runner.running().into_iter().find(|r| r.job_id == job.id) {
            for entry in &stale {
                let reason = format!(
                    "not resumed after restart: superseded by execution {}",
                    live.execution_id
                );
                self.abandon(job, entry, reason, report).await;
            }
            return;
        }

        // The run lock outlives its process only if that process is alive.
        let run_lock = match self.store.run_locks().try_acquire(&job.id).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                info!(job = %job.id, execution = %newest.id, "job is running in another process; leaving it alone");
                report.live_elsewhere.push(job.id.clone());
                return;
            }
            Err(e) => {
                error!(job = %job.id, error = %e, "could not take run lock");
                report
                    .errors
                    .push(format!("job {}: taking run lock: {e}", job.id));
                return;
            }
        };

        // Only one process per job can run; older leftovers cannot be resumed.
        for entry in older {
            let reason = format!(
                "not resumed after restart: superseded by execution {}",
                newest.id
            );
            self.abandon(job, entry, reason, report).await;
        }

        self.resume(job, newest, run_lock, report).await;
    }

    async fn resume(
        &self,
        job: &Job,
        entry: &HistoryEntry,
        run_lock: FileLock,
        report: &mut RecoveryReport,
    ) {
        let target = entry.target.clone().unwrap_or_else(|| job.target());

        if let Err(e) = self.validator.check_target(target.clone()).await {
            let detail = match e {
                NasJobsError::Validation(msg) => msg,
                other => other.to_string(),
            };
            warn!(
                job = %job.id,
                execution = %entry.id,
                reason = %detail,
                "stored target no longer valid; not relaunching"
            );
            self.abandon(job, entry, format!("not resumed after restart: {detail}"), report)
                .await;
            return;
        }

        let request = RunRequest::resume(&entry.id, target.clone()).with_run_lock(run_lock);
        let new_id = request.execution_id.clone();

        let rewrite = EntryRewrite::Resumed {
            resumed_as: new_id.clone(),
            at: Utc::now(),
        };
        match self.store.rewrite_entry(&job.id, &entry.id, rewrite).await {
            Ok(true) => {}
            Ok(false) => {
                report.errors.push(format!(
                    "job {}: entry {} disappeared before it could be resumed",
                    job.id, entry.id
                ));
                return;
            }
            Err(e) => {
                error!(job = %job.id, execution = %entry.id, error = %e, "failed to mark entry resumed");
                report
                    .errors
                    .push(format!("job {}: marking {} resumed: {e}", job.id, entry.id));
                return;
            }
        }

        info!(job = %job.id, from = %entry.id, to = %new_id, "relaunching interrupted execution");

        match self.runner.run_with(&job.id, request).await {
            Ok(outcome) => report.resumed.push(ResumedExecution {
                job_id: job.id.clone(),
                original_execution_id: entry.id.clone(),
                outcome,
            }),
            Err(e) => {
                // The original already points at `new_id`; make sure it exists.
                warn!(job = %job.id, execution = %new_id, error = %e, "relaunch rejected");
                let now = Utc::now();
                let failed = HistoryEntry::running(&new_id, target, now, Some(entry.id.clone()))
                    .finish(now, None, Some(format!("relaunch after restart failed: {e}")), String::new());
                if let Err(store_err) = self.store.add_history(&job.id, failed).await {
                    error!(job = %job.id, error = %store_err, "failed to record rejected relaunch");
                }
                report
                    .errors
                    .push(format!("job {}: relaunch of {} failed: {e}", job.id, entry.id));
            }
        }
    }

    async fn abandon(
        &self,
        job: &Job,
        entry: &HistoryEntry,
        reason: String,
        report: &mut RecoveryReport,
    ) {
        let rewrite = EntryRewrite::Failed {
            error: reason.clone(),
            at: Utc::now(),
        };
        match self.store.rewrite_entry(&job.id, &entry.id, rewrite).await {
            Ok(_) => report.failed.push(AbandonedExecution {
                job_id: job.id.clone(),
                execution_id: entry.id.clone(),
                reason,
            }),
            Err(e) => {
                error!(job = %job.id, execution = %entry.id, error = %e, "failed to mark entry failed");
                report
                    .errors
                    .push(format!("job {}: marking {} failed: {e}", job.id, entry.id));
            }
        }
    }
}

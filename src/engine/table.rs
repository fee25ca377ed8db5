// src/engine/table.rs

//! Pure bookkeeping of which jobs currently own a live process.
//!
//! [`RunTable`] has no channels, no Tokio types and performs no IO. The
//! runner keeps it behind a synchronous mutex and never holds that mutex
//! across an `.await`, which is what makes check-and-insert atomic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::exec::{ProcessSignaller, SharedOutput};

/// In-memory marker that a job has a live process.
#[derive(Clone)]
pub struct RunningJobRecord {
    pub job_id: String,
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub pid: Option<u32>,
    pub output: SharedOutput,
    signaller: Option<Arc<dyn ProcessSignaller>>,
}

impl fmt::Debug for RunningJobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningJobRecord")
            .field("job_id", &self.job_id)
            .field("execution_id", &self.execution_id)
            .field("started_at", &self.started_at)
            .field("pid", &self.pid)
            .field("attached", &self.signaller.is_some())
            .finish()
    }
}

impl RunningJobRecord {
    /// A reservation: the process has not been spawned yet.
    pub fn new(
        job_id: impl Into<String>,
        execution_id: impl Into<String>,
        started_at: DateTime<Utc>,
        output: SharedOutput,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            execution_id: execution_id.into(),
            started_at,
            pid: None,
            output,
            signaller: None,
        }
    }

    pub fn signaller(&self) -> Option<&Arc<dyn ProcessSignaller>> {
        self.signaller.as_ref()
    }
}

#[derive(Debug)]
enum Slot {
    Running(RunningJobRecord),
    /// A delete is in flight; runs must wait for it to finish.
    Deleting,
}

#[derive(Debug, Default)]
pub struct RunTable {
    slots: HashMap<String, Slot>,
}

impl RunTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the job for `record`. Fails if anything already holds it.
    pub fn try_reserve(&mut self, record: RunningJobRecord) -> Result<(), String> {
        match self.slots.get(&record.job_id) {
            Some(Slot::Running(existing)) => Err(format!(
                "job '{}' is already running (execution {})",
                record.job_id, existing.execution_id
            )),
            Some(Slot::Deleting) => Err(format!(
                "job '{}' is being deleted",
                record.job_id
            )),
            None => {
                self.slots
                    .insert(record.job_id.clone(), Slot::Running(record));
                Ok(())
            }
        }
    }

    /// Attach the spawned process to its reservation.
    ///
    /// Returns `false` if the reservation was cleared in the meantime (a
    /// `stop` raced the spawn); the caller then owns the termination.
    pub fn attach(
        &mut self,
        job_id: &str,
        execution_id: &str,
        pid: Option<u32>,
        signaller: Arc<dyn ProcessSignaller>,
    ) -> bool {
        match self.slots.get_mut(job_id) {
            Some(Slot::Running(record)) if record.execution_id == execution_id => {
                record.pid = pid;
                record.signaller = Some(signaller);
                true
            }
            _ => false,
        }
    }

    /// Remove the record, but only if it still belongs to `execution_id`.
    pub fn release(&mut self, job_id: &str, execution_id: &str) -> bool {
        let owned = matches!(
            self.slots.get(job_id),
            Some(Slot::Running(record)) if record.execution_id == execution_id
        );
        if owned {
            self.slots.remove(job_id);
        }
        owned
    }

    /// Remove and return the record for `job_id` regardless of execution.
    pub fn take(&mut self, job_id: &str) -> Option<RunningJobRecord> {
        match self.slots.get(job_id) {
            Some(Slot::Running(_)) => match self.slots.remove(job_id) {
                Some(Slot::Running(record)) => Some(record),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn begin_delete(&mut self, job_id: &str) -> Result<(), String> {
        match self.slots.get(job_id) {
            Some(Slot::Running(record)) => Err(format!(
                "job '{}' is running (execution {}); stop it before deleting",
                job_id, record.execution_id
            )),
            Some(Slot::Deleting) => Err(format!("job '{job_id}' is already being deleted")),
            None => {
                self.slots.insert(job_id.to_string(), Slot::Deleting);
                Ok(())
            }
        }
    }

    pub fn end_delete(&mut self, job_id: &str) {
        if matches!(self.slots.get(job_id), Some(Slot::Deleting)) {
            self.slots.remove(job_id);
        }
    }

    pub fn get(&self, job_id: &str) -> Option<&RunningJobRecord> {
        match self.slots.get(job_id) {
            Some(Slot::Running(record)) => Some(record),
            _ => None,
        }
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.get(job_id).is_some()
    }

    /// Whether `execution_id` is the live execution of `job_id`.
    pub fn is_tracking(&self, job_id: &str, execution_id: &str) -> bool {
        self.get(job_id)
            .is_some_and(|r| r.execution_id == execution_id)
    }

    pub fn running(&self) -> Vec<RunningJobRecord> {
        self.slots
            .values()
            .filter_map(|slot| match slot {
                Slot::Running(record) => Some(record.clone()),
                Slot::Deleting => None,
            })
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Running(_)))
            .count()
    }
}

// src/store/mod.rs

//! Durable job definitions and their bounded execution history.
//!
//! [`JobStore`] is a cheap, cloneable handle; a single writer task
//! ([`actor`]) serializes every read-modify-write of the backing
//! [`document`] within this process, and the lock files in [`locks`]
//! serialize it against other processes. Callers never touch the file
//! directly.

pub mod actor;
pub mod document;
pub mod locks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::errors::{NasJobsError, Result};
use crate::fs::FileSystem;
use crate::job::{HistoryEntry, Job, JobPatch, JobSpec, JobValidator};

pub use actor::EntryRewrite;
pub use document::Document;
pub use locks::{document_lock_path, RunLocks};

use actor::{StoreActor, StoreRequest};

#[derive(Debug, Clone)]
pub struct JobStore {
    tx: mpsc::Sender<StoreRequest>,
    run_locks: RunLocks,
}

impl JobStore {
    /// Check that the document at `path` parses (missing file = no jobs) and
    /// start the writer loop.
    pub async fn open(
        path: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        validator: JobValidator,
    ) -> Result<Self> {
        let path = path.into();

        let doc = {
            let fs = Arc::clone(&fs);
            let path = path.clone();
            tokio::task::spawn_blocking(move || Document::load(fs.as_ref(), &path))
                .await
                .context("document reader task failed")??
        };

        info!(path = ?path, jobs = doc.jobs.len(), "job document loaded");

        let run_locks = RunLocks::for_document(&path, Arc::clone(&fs));
        let tx = StoreActor::new(path, fs, validator).spawn();
        Ok(Self { tx, run_locks })
    }

    /// Per-job locks held while a process of the job is alive.
    pub fn run_locks(&self) -> &RunLocks {
        &self.run_locks
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.request(|reply| StoreRequest::List { reply }).await?
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let id = id.to_string();
        self.request(|reply| StoreRequest::Get { id, reply }).await?
    }

    /// Like [`get_job`](Self::get_job) but an unknown id is an error.
    pub async fn require_job(&self, id: &str) -> Result<Job> {
        self.get_job(id)
            .await?
            .ok_or_else(|| NasJobsError::JobNotFound(id.to_string()))
    }

    pub async fn create_job(&self, spec: JobSpec) -> Result<Job> {
        self.request(|reply| StoreRequest::Create { spec, reply })
            .await?
    }

    pub async fn update_job(&self, id: &str, patch: JobPatch) -> Result<Job> {
        let id = id.to_string();
        self.request(|reply| StoreRequest::Update { id, patch, reply })
            .await?
    }

    /// Remove a job and its history.
    ///
    /// This does not know about running processes; the engine guards it so a
    /// running job cannot be deleted.
    pub async fn delete_job(&self, id: &str) -> Result<Job> {
        let id = id.to_string();
        self.request(|reply| StoreRequest::Delete { id, reply })
            .await?
    }

    /// Insert `entry` at the head of the job's history (replacing an entry
    /// with the same execution id), prune to the keep-count and refresh
    /// `last_run` / `last_result`.
    ///
    /// Returns `Ok(false)` if the job has been deleted in the meantime.
    pub async fn add_history(&self, id: &str, entry: HistoryEntry) -> Result<bool> {
        let id = id.to_string();
        self.request(|reply| StoreRequest::AddHistory { id, entry, reply })
            .await?
    }

    /// Rewrite an existing entry in place (recovery only).
    pub async fn rewrite_entry(
        &self,
        id: &str,
        entry_id: &str,
        rewrite: EntryRewrite,
    ) -> Result<bool> {
        let id = id.to_string();
        let entry_id = entry_id.to_string();
        self.request(|reply| StoreRequest::RewriteEntry {
            id,
            entry_id,
            rewrite,
            reply,
        })
        .await?
    }

    pub async fn history(&self, id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self.require_job(id).await?.history)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> StoreRequest,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| NasJobsError::StoreClosed)?;
        rx.await.map_err(|_| NasJobsError::StoreClosed)
    }
}

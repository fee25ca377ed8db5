// src/store/actor.rs

//! Single-writer loop over the document file.
//!
//! Every read and mutation is a message handled in order. Nothing is cached
//! between messages: reads load the file, and a mutation takes the document
//! lock, re-reads the file, applies the change, validates it and writes the
//! whole document back before releasing the lock. Other processes sharing
//! the file therefore never lose each other's writes, and a failed write
//! leaves the file untouched.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::errors::{NasJobsError, Result};
use crate::fs::FileSystem;
use crate::job::{prune_keeping_lineage, HistoryEntry, Job, JobPatch, JobSpec, JobValidator};
use crate::types::RunStatus;

use super::document::Document;
use super::locks::document_lock_path;

/// How recovery rewrites a stale `running` entry.
#[derive(Debug, Clone)]
pub enum EntryRewrite {
    Resumed {
        resumed_as: String,
        at: DateTime<Utc>,
    },
    Failed {
        error: String,
        at: DateTime<Utc>,
    },
}

pub(crate) enum StoreRequest {
    List {
        reply: oneshot::Sender<Result<Vec<Job>>>,
    },
    Get {
        id: String,
        reply: oneshot::Sender<Result<Option<Job>>>,
    },
    Create {
        spec: JobSpec,
        reply: oneshot::Sender<Result<Job>>,
    },
    Update {
        id: String,
        patch: JobPatch,
        reply: oneshot::Sender<Result<Job>>,
    },
    Delete {
        id: String,
        reply: oneshot::Sender<Result<Job>>,
    },
    AddHistory {
        id: String,
        entry: HistoryEntry,
        reply: oneshot::Sender<Result<bool>>,
    },
    RewriteEntry {
        id: String,
        entry_id: String,
        rewrite: EntryRewrite,
        reply: oneshot::Sender<Result<bool>>,
    },
}

pub(crate) struct StoreActor {
    path: PathBuf,
    lock_path: PathBuf,
    fs: Arc<dyn FileSystem>,
    validator: JobValidator,
}

/// What a mutation decided to do with the re-read document.
enum Change<T> {
    Write(T),
    Unchanged(T),
}

impl StoreActor {
    pub(crate) fn new(path: PathBuf, fs: Arc<dyn FileSystem>, validator: JobValidator) -> Self {
        Self {
            lock_path: document_lock_path(&path),
            path,
            fs,
            validator,
        }
    }

    /// Spawn the loop; it ends once every `JobStore` handle is dropped.
    pub(crate) fn spawn(self) -> mpsc::Sender<StoreRequest> {
        let (tx, mut rx) = mpsc::channel::<StoreRequest>(64);

        tokio::spawn(async move {
            let actor = self;
            debug!(path = ?actor.path, "job store loop started");

            while let Some(request) = rx.recv().await {
                actor.handle(request).await;
            }

            debug!(path = ?actor.path, "job store loop finished (channel closed)");
        });

        tx
    }

    async fn handle(&self, request: StoreRequest) {
        // A dropped reply receiver only means the caller stopped waiting.
        match request {
            StoreRequest::List { reply } => {
                let _ = reply.send(self.load().await.map(|doc| doc.jobs));
            }
            StoreRequest::Get { id, reply } => {
                let _ = reply.send(self.load().await.map(|doc| doc.job(&id).cloned()));
            }
            StoreRequest::Create { spec, reply } => {
                let _ = reply.send(self.create(spec).await);
            }
            StoreRequest::Update { id, patch, reply } => {
                let _ = reply.send(self.update(id, patch).await);
            }
            StoreRequest::Delete { id, reply } => {
                let _ = reply.send(self.delete(id).await);
            }
            StoreRequest::AddHistory { id, entry, reply } => {
                let _ = reply.send(self.add_history(id, entry).await);
            }
            StoreRequest::RewriteEntry {
                id,
                entry_id,
                rewrite,
                reply,
            } => {
                let _ = reply.send(self.rewrite_entry(id, entry_id, rewrite).await);
            }
        }
    }

    async fn create(&self, spec: JobSpec) -> Result<Job> {
        let job = self
            .transact(move |doc, validator| {
                validator.validate_spec(&spec)?;
                let job = Job::from_spec(spec, Utc::now());
                doc.jobs.push(job.clone());
                Ok(Change::Write(job))
            })
            .await?;

        info!(job = %job.id, name = %job.name, kind = %job.kind, "job created");
        Ok(job)
    }

    async fn update(&self, id: String, patch: JobPatch) -> Result<Job> {
        let key = id.clone();
        let updated = self
            .transact(move |doc, validator| {
                let job = doc
                    .job_mut(&key)
                    .ok_or_else(|| NasJobsError::JobNotFound(key.clone()))?;

                job.apply_patch(patch, Utc::now());
                validator.validate_spec(&job.spec())?;

                // A smaller keep-count applies right away.
                job.history =
                    prune_keeping_lineage(std::mem::take(&mut job.history), job.retention.keep_last);
                job.refresh_summary();
                Ok(Change::Write(job.clone()))
            })
            .await?;

        info!(job = %id, "job updated");
        Ok(updated)
    }

    async fn delete(&self, id: String) -> Result<Job> {
        let key = id.clone();
        let removed = self
            .transact(move |doc, _| {
                let index = doc
                    .jobs
                    .iter()
                    .position(|j| j.id == key)
                    .ok_or_else(|| NasJobsError::JobNotFound(key.clone()))?;
                Ok(Change::Write(doc.jobs.remove(index)))
            })
            .await?;

        info!(job = %id, "job deleted");
        Ok(removed)
    }

    async fn add_history(&self, id: String, entry: HistoryEntry) -> Result<bool> {
        self.transact(move |doc, _| {
            let Some(job) = doc.job_mut(&id) else {
                warn!(
                    job = %id,
                    execution = %entry.id,
                    status = %entry.status,
                    "job no longer exists; dropping history entry"
                );
                return Ok(Change::Unchanged(false));
            };

            // A finished execution replaces its own `running` entry.
            job.history.retain(|e| e.id != entry.id);
            job.history.insert(0, entry);
            job.history =
                prune_keeping_lineage(std::mem::take(&mut job.history), job.retention.keep_last);
            job.refresh_summary();
            Ok(Change::Write(true))
        })
        .await
    }

    async fn rewrite_entry(
        &self,
        id: String,
        entry_id: String,
        rewrite: EntryRewrite,
    ) -> Result<bool> {
        self.transact(move |doc, _| {
            let Some(job) = doc.job_mut(&id) else {
                warn!(job = %id, execution = %entry_id, "job no longer exists; cannot rewrite entry");
                return Ok(Change::Unchanged(false));
            };
            let Some(entry) = job.history_entry_mut(&entry_id) else {
                warn!(job = %id, execution = %entry_id, "history entry no longer exists");
                return Ok(Change::Unchanged(false));
            };

            match rewrite {
                EntryRewrite::Resumed { resumed_as, at } => {
                    entry.status = RunStatus::Resumed;
                    entry.success = false;
                    entry.finished_at = Some(at);
                    entry.resumed_as = Some(resumed_as);
                }
                EntryRewrite::Failed { error, at } => {
                    entry.status = RunStatus::Failed;
                    entry.success = false;
                    entry.finished_at = Some(at);
                    entry.error = Some(error);
                }
            }
            job.refresh_summary();
            Ok(Change::Write(true))
        })
        .await
    }

    async fn load(&self) -> Result<Document> {
        let fs = Arc::clone(&self.fs);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Document::load(fs.as_ref(), &path))
            .await
            .context("document reader task failed")?
    }

    /// Under the document lock: re-read, apply `change`, write if asked to.
    ///
    /// Runs on the blocking pool as a whole, validation included, since path
    /// checks and the lock wait both block.
    async fn transact<T, F>(&self, change: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Document, &JobValidator) -> Result<Change<T>> + Send + 'static,
    {
        let fs = Arc::clone(&self.fs);
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        let validator = self.validator.clone();

        tokio::task::spawn_blocking(move || -> Result<T> {
            let _lock = fs.lock_exclusive(&lock_path)?;
            let mut doc = Document::load(fs.as_ref(), &path)?;
            match change(&mut doc, &validator)? {
                Change::Write(value) => {
                    fs.write_atomic(&path, &doc.to_bytes()?)?;
                    Ok(value)
                }
                Change::Unchanged(value) => Ok(value),
            }
        })
        .await
        .context("document writer task failed")?
    }
}

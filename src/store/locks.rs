// src/store/locks.rs

//! Lock files next to the document.
//!
//! Several `nasjobs` processes may share one document (a `serve` instance
//! and crontab-started `run`s). Two kinds of advisory lock keep them apart:
//!
//! - `.<doc>.lock` is held for the length of one read-modify-write of the
//!   document.
//! - `.<doc>.runs/<job>.lock` is held for as long as a process of that job
//!   is alive. The OS drops it when the owning process dies, which is how
//!   recovery tells a crashed run from one that is still going elsewhere.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::errors::Result;
use crate::fs::{FileLock, FileSystem};

/// `config.json` -> `.config.json.lock`.
pub fn document_lock_path(document: &Path) -> PathBuf {
    document.with_file_name(format!(".{}.lock", file_name(document)))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Per-job run locks for one document.
#[derive(Debug, Clone)]
pub struct RunLocks {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl RunLocks {
    pub fn for_document(document: &Path, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            dir: document.with_file_name(format!(".{}.runs", file_name(document))),
            fs,
        }
    }

    pub fn path(&self, job_id: &str) -> PathBuf {
        let safe: String = job_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.lock"))
    }

    /// Take the run lock of `job_id`, or `None` if another holder has it.
    pub async fn try_acquire(&self, job_id: &str) -> Result<Option<FileLock>> {
        let fs = Arc::clone(&self.fs);
        let path = self.path(job_id);
        let lock = tokio::task::spawn_blocking(move || fs.try_lock_exclusive(&path))
            .await
            .context("run lock task failed")??;
        Ok(lock)
    }
}

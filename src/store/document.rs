// src/store/document.rs

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::job::Job;

/// The persisted application document.
///
/// Jobs live under `backupJobs`; every other top-level key belongs to the
/// rest of the dashboard and is carried through untouched, because the file
/// is always rewritten as a whole.
///
/// ```json
/// {
///   "storageRoot": "/mnt/storage",
///   "backupJobs": [ { "id": "…", "name": "photos", "kind": "local-mirror", … } ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, rename = "backupJobs")]
    pub jobs: Vec<Job>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Document {
    /// Read the whole document; a missing file is an empty document.
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        match fs.read_optional(path)? {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                Ok(serde_json::from_slice(&bytes)?)
            }
            _ => Ok(Document::default()),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }
}

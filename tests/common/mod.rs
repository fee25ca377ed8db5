#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use nasjobs::config::ConfigFile;
use nasjobs::engine::Engine;
use nasjobs::fs::RealFileSystem;
use nasjobs::job::{HistoryEntry, JobSpec};
use nasjobs::store::Document;
use nasjobs_test_utils::builders::{ConfigFileBuilder, JobSpecBuilder};
use nasjobs_test_utils::fake_spawner::FakeSpawner;

/// A temporary allowed root with a document file next to it, and an engine
/// driven by a `FakeSpawner`.
pub struct Fixture {
    pub dir: TempDir,
    pub root: PathBuf,
    pub config: ConfigFile,
    pub spawner: FakeSpawner,
    pub engine: Engine,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(|b| b).await
    }

    pub async fn with_config(configure: impl FnOnce(ConfigFileBuilder) -> ConfigFileBuilder) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = dir.path().join("storage");
        std::fs::create_dir_all(&root).expect("create storage root");
        let document = dir.path().join("config.json");

        let config = configure(ConfigFileBuilder::new(&root, &document)).build();
        let spawner = FakeSpawner::new();
        let engine = open_engine(&config, &spawner).await;

        Self {
            dir,
            root,
            config,
            spawner,
            engine,
        }
    }

    /// Create `rel` under the allowed root and return its absolute path.
    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.root.join(rel);
        std::fs::create_dir_all(&path).expect("create dir");
        path
    }

    /// A local-mirror spec between two fresh directories.
    pub fn mirror_spec(&self, name: &str) -> JobSpec {
        let source = self.mkdir(&format!("{name}-src"));
        let destination = self.mkdir(&format!("{name}-dst"));
        JobSpecBuilder::new(name, source, destination).build()
    }

    pub fn document_path(&self) -> &Path {
        &self.config.document
    }

    /// Open a second engine on the same document, as after a restart.
    pub async fn restart(&self, spawner: &FakeSpawner) -> Engine {
        open_engine(&self.config, spawner).await
    }

    /// Put `entry` at the head of a job's history directly in the file, the
    /// way a crashed instance would have left it.
    pub fn inject_entry(&self, job_id: &str, entry: HistoryEntry) {
        let path = self.document_path();
        let mut doc = Document::load(&RealFileSystem, path).expect("load document");
        let job = doc.job_mut(job_id).expect("job exists in document");
        job.history.insert(0, entry);
        std::fs::write(path, doc.to_bytes().expect("serialize document")).expect("write document");
    }
}

pub async fn open_engine(config: &ConfigFile, spawner: &FakeSpawner) -> Engine {
    Engine::open(config, Arc::new(RealFileSystem), Arc::new(spawner.clone()))
        .await
        .expect("open engine")
}

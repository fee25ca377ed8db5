// src/fs/mod.rs

//! Filesystem seam shared by the path validator and the job store.
//!
//! The store only ever reads the whole document and replaces the whole
//! document, so the trait is deliberately small. Advisory lock files let
//! several `nasjobs` processes share one document.

use std::any::Any;
use std::fmt::{self, Debug};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

pub mod mock;

pub use mock::MockFileSystem;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    /// Read a file, returning `Ok(None)` if it does not exist.
    fn read_optional(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Replace `path` with `contents` so readers never observe a partial file.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// Block until an exclusive lock on `path` is held, creating the file
    /// if needed.
    fn lock_exclusive(&self, path: &Path) -> Result<FileLock>;

    /// Like [`lock_exclusive`](Self::lock_exclusive), but `Ok(None)` when
    /// another holder has the lock.
    fn try_lock_exclusive(&self, path: &Path) -> Result<Option<FileLock>>;
}

/// An exclusive lock on a file; released when dropped.
pub struct FileLock {
    path: PathBuf,
    _held: Box<dyn Any + Send + Sync>,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>, held: impl Any + Send + Sync) -> Self {
        Self {
            path: path.into(),
            _held: Box::new(held),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Debug for FileLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLock").field("path", &self.path).finish()
    }
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_optional(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading file {:?}", path)),
        }
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating dir {:?}", parent))?;
            }
        }

        let tmp = temp_sibling(path);
        {
            let mut file =
                fs::File::create(&tmp).with_context(|| format!("creating file {:?}", tmp))?;
            file.write_all(contents)
                .with_context(|| format!("writing to file {:?}", tmp))?;
            file.sync_all()
                .with_context(|| format!("syncing file {:?}", tmp))?;
        }
        fs::rename(&tmp, path).with_context(|| format!("renaming {:?} to {:?}", tmp, path))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).with_context(|| format!("canonicalizing {:?}", path))
    }

    fn lock_exclusive(&self, path: &Path) -> Result<FileLock> {
        let file = open_lock_file(path)?;
        FileExt::lock_exclusive(&file).with_context(|| format!("locking {:?}", path))?;
        Ok(FileLock::new(path, file))
    }

    fn try_lock_exclusive(&self, path: &Path) -> Result<Option<FileLock>> {
        let file = open_lock_file(path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(FileLock::new(path, file))),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("locking {:?}", path)),
        }
    }
}

/// Open (never truncate) a lock file. The lock lives as long as the handle;
/// closing it on drop is what releases it.
fn open_lock_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
    }
    fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("opening lock file {:?}", path))
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// `config.json` -> `.config.json.tmp` in the same directory, so the final
/// rename never crosses a filesystem boundary.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

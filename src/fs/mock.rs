// src/fs/mock.rs

use super::{FileLock, FileSystem};
use anyhow::{anyhow, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-memory filesystem for tests.
///
/// Directories are tracked separately from files; adding a file implicitly
/// creates its parents. Symlinks can be declared with [`MockFileSystem::add_symlink`]
/// so path confinement can be exercised without touching disk. Locks are
/// shared by every clone, like flock between processes.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    inner: Arc<Mutex<MockState>>,
    unlocked: Arc<Condvar>,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: HashSet<PathBuf>,
    links: HashMap<PathBuf, PathBuf>,
    locks: HashSet<PathBuf>,
    fail_writes: bool,
    writes: usize,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.add_dir("/");
        fs
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.inner.lock();
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            state.dirs.insert(ancestor.to_path_buf());
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.inner
            .lock()
            .files
            .insert(path.to_path_buf(), content.into());
    }

    /// Declare `link` as a symlink resolving to `target`.
    pub fn add_symlink(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        self.inner
            .lock()
            .links
            .insert(link.as_ref().to_path_buf(), target.as_ref().to_path_buf());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.inner.lock().files.get(path.as_ref()).cloned()
    }

    /// Make every subsequent `write_atomic` fail (e.g. disk full).
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }

    pub fn is_locked(&self, path: impl AsRef<Path>) -> bool {
        self.inner.lock().locks.contains(path.as_ref())
    }

    fn held(&self, path: &Path) -> FileLock {
        FileLock::new(
            path,
            MockLock {
                path: path.to_path_buf(),
                inner: Arc::clone(&self.inner),
                unlocked: Arc::clone(&self.unlocked),
            },
        )
    }

    fn resolve(state: &MockState, path: &Path) -> PathBuf {
        // Longest declared link prefix wins.
        let mut best: Option<(&PathBuf, &PathBuf)> = None;
        for (link, target) in state.links.iter() {
            if path.starts_with(link)
                && best.is_none_or(|(b, _)| link.components().count() > b.components().count())
            {
                best = Some((link, target));
            }
        }
        match best {
            Some((link, target)) => match path.strip_prefix(link) {
                Ok(rest) if rest.as_os_str().is_empty() => target.clone(),
                Ok(rest) => target.join(rest),
                Err(_) => path.to_path_buf(),
            },
            None => path.to_path_buf(),
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_optional(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let state = self.inner.lock();
        if state.dirs.contains(path) {
            return Err(anyhow!("Is a directory: {:?}", path));
        }
        Ok(state.files.get(path).cloned())
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        {
            let mut state = self.inner.lock();
            if state.fail_writes {
                return Err(anyhow!("simulated write failure for {:?}", path));
            }
            state.writes += 1;
        }
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.inner.lock();
        let path = Self::resolve(&state, path);
        state.files.contains_key(&path) || state.dirs.contains(&path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let state = self.inner.lock();
        let path = Self::resolve(&state, path);
        state.dirs.contains(&path)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        let state = self.inner.lock();
        let resolved = Self::resolve(&state, path);
        if state.files.contains_key(&resolved) || state.dirs.contains(&resolved) {
            Ok(resolved)
        } else {
            Err(anyhow!("File not found: {:?}", path))
        }
    }

    fn lock_exclusive(&self, path: &Path) -> Result<FileLock> {
        let mut state = self.inner.lock();
        while state.locks.contains(path) {
            self.unlocked.wait(&mut state);
        }
        state.locks.insert(path.to_path_buf());
        drop(state);
        Ok(self.held(path))
    }

    fn try_lock_exclusive(&self, path: &Path) -> Result<Option<FileLock>> {
        if !self.inner.lock().locks.insert(path.to_path_buf()) {
            return Ok(None);
        }
        Ok(Some(self.held(path)))
    }
}

struct MockLock {
    path: PathBuf,
    inner: Arc<Mutex<MockState>>,
    unlocked: Arc<Condvar>,
}

impl Drop for MockLock {
    fn drop(&mut self) {
        self.inner.lock().locks.remove(&self.path);
        self.unlocked.notify_all();
    }
}

// src/guard/paths.rs

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::fs::FileSystem;

/// Confines job locations to a single allowed root (e.g. the storage mount).
///
/// A path is accepted when:
/// - it is non-empty, absolute and free of NUL bytes,
/// - its lexically normalized form (`.` and `..` folded) lies under the root,
/// - the nearest existing ancestor (or the path itself), once symlinks are
///   resolved, still lies under the canonical root.
///
/// The second filesystem check is what stops `/mnt/storage/link -> /etc`.
#[derive(Clone)]
pub struct PathValidator {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for PathValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathValidator")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl PathValidator {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        let root = root.into();
        let root = normalize(&root).unwrap_or(root);
        Self { root, fs }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn validate(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Return the normalized absolute path if it is inside the root.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let trimmed = path.trim();
        if trimmed.is_empty() || trimmed.contains('\0') {
            return None;
        }

        let candidate = Path::new(trimmed);
        if !candidate.is_absolute() {
            debug!(path = %trimmed, "rejecting relative path");
            return None;
        }

        let normalized = normalize(candidate)?;
        if !normalized.starts_with(&self.root) {
            debug!(path = %trimmed, root = ?self.root, "path outside allowed root");
            return None;
        }

        let canonical_root = self
            .fs
            .canonicalize(&self.root)
            .unwrap_or_else(|_| self.root.clone());

        let existing = normalized.ancestors().find(|p| self.fs.exists(p))?;
        let resolved = self.fs.canonicalize(existing).ok()?;
        if !resolved.starts_with(&canonical_root) {
            debug!(
                path = %trimmed,
                resolved = ?resolved,
                "path escapes allowed root through a link"
            );
            return None;
        }

        Some(normalized)
    }
}

/// Lexically fold `.` and `..` in an absolute path.
///
/// Returns `None` for relative input. `..` at the filesystem root stays at
/// the root, the same as the kernel does.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if out.parent().is_some() {
                    out.pop();
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    if out.is_absolute() { Some(out) } else { None }
}

// src/exec/command.rs

//! Argument-vector construction for each job kind.
//!
//! Nothing here is ever handed to a shell. Each exclude pattern becomes one
//! `--exclude=PATTERN` element, so a pattern can neither split into extra
//! arguments nor be read as a separate option.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::job::Target;
use crate::types::JobKind;

/// Executables used for each family of job kinds (`[tools]` in the config).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolPaths {
    #[serde(default = "default_rsync")]
    pub rsync: String,
    #[serde(default = "default_tar")]
    pub tar: String,
    #[serde(default = "default_rclone")]
    pub rclone: String,
}

fn default_rsync() -> String {
    "rsync".to_string()
}

fn default_tar() -> String {
    "tar".to_string()
}

fn default_rclone() -> String {
    "rclone".to_string()
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            rsync: default_rsync(),
            tar: default_tar(),
            rclone: default_rclone(),
        }
    }
}

/// A program and its literal arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for Invocation {
    /// Debug-quoted rendering for logs only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg:?}")?;
        }
        Ok(())
    }
}

/// Build the invocation for one execution.
///
/// `started_at` names the archive for `local-archive` jobs, so a relaunch
/// after a crash writes a fresh file instead of appending to a torn one.
pub fn build_invocation(
    target: &Target,
    excludes: &[String],
    job_name: &str,
    tools: &ToolPaths,
    started_at: DateTime<Utc>,
) -> Invocation {
    let exclude_args = excludes.iter().map(|p| format!("--exclude={p}"));

    match target.kind {
        JobKind::LocalMirror => {
            let mut args = vec!["--archive".to_string(), "--delete".to_string()];
            args.extend(exclude_args);
            args.push("--".to_string());
            args.push(with_trailing_slash(&target.source));
            args.push(with_trailing_slash(&target.destination));
            Invocation {
                program: tools.rsync.clone(),
                args,
            }
        }
        JobKind::LocalArchive => {
            let archive = format!(
                "{}/{}",
                target.destination.trim_end_matches('/'),
                archive_file_name(job_name, started_at)
            );
            let mut args = vec![
                "--create".to_string(),
                "--gzip".to_string(),
                "--file".to_string(),
                archive,
            ];
            args.extend(exclude_args);
            args.push("--directory".to_string());
            args.push(target.source.clone());
            args.push(".".to_string());
            Invocation {
                program: tools.tar.clone(),
                args,
            }
        }
        JobKind::RemoteCopy | JobKind::RemoteSync | JobKind::RemoteMove => {
            let verb = match target.kind {
                JobKind::RemoteCopy => "copy",
                JobKind::RemoteSync => "sync",
                _ => "move",
            };
            let mut args = vec![
                verb.to_string(),
                target.source.clone(),
                target.destination.clone(),
            ];
            args.extend(exclude_args);
            Invocation {
                program: tools.rclone.clone(),
                args,
            }
        }
    }
}

/// `photos (2024)` at 2024-05-01 03:00:00 -> `photos-2024-20240501-030000.tar.gz`.
pub fn archive_file_name(job_name: &str, at: DateTime<Utc>) -> String {
    let mut slug = String::with_capacity(job_name.len());
    for c in job_name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "archive" } else { slug };
    format!("{slug}-{}.tar.gz", at.format("%Y%m%d-%H%M%S"))
}

/// rsync copies the *contents* of `src/`, not `src` itself.
fn with_trailing_slash(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}

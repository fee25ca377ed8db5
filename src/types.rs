use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What kind of data movement a job performs.
///
/// - `LocalMirror`: `rsync` the source tree onto a local destination.
/// - `LocalArchive`: write a timestamped `tar.gz` of the source into the
///   destination directory.
/// - `RemoteCopy` / `RemoteSync` / `RemoteMove`: hand the source to `rclone`
///   with the matching verb and a `remote:path` destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    LocalMirror,
    LocalArchive,
    RemoteCopy,
    RemoteSync,
    RemoteMove,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::LocalMirror,
        JobKind::LocalArchive,
        JobKind::RemoteCopy,
        JobKind::RemoteSync,
        JobKind::RemoteMove,
    ];

    /// Remote kinds write to an `rclone` remote instead of a local path.
    pub fn is_remote(self) -> bool {
        matches!(
            self,
            JobKind::RemoteCopy | JobKind::RemoteSync | JobKind::RemoteMove
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::LocalMirror => "local-mirror",
            JobKind::LocalArchive => "local-archive",
            JobKind::RemoteCopy => "remote-copy",
            JobKind::RemoteSync => "remote-sync",
            JobKind::RemoteMove => "remote-move",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "invalid job kind: {wanted} (expected one of local-mirror, local-archive, remote-copy, remote-sync, remote-move)"
                )
            })
    }
}

/// Summary of the most recent finished execution of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LastResult {
    #[default]
    None,
    Success,
    Failed,
}

impl fmt::Display for LastResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LastResult::None => "none",
            LastResult::Success => "success",
            LastResult::Failed => "failed",
        };
        f.pad(s)
    }
}

/// Status of a single recorded execution.
///
/// `Running` is persisted while the process is alive; finding one at startup
/// means the previous instance died mid-run. `Resumed` is the terminal marker
/// recovery puts on such an entry once it has been relaunched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Resumed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Resumed => "resumed",
        };
        f.pad(s)
    }
}

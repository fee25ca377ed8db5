// src/exec/backend.rs

//! Pluggable process spawning.
//!
//! The runner talks to a [`ProcessSpawner`] instead of `tokio::process`
//! directly, so tests can hand it a scripted fake while production uses
//! [`TokioSpawner`].
//!
//! A spawned process is split into independent parts up front: the two
//! output streams, a future that resolves on exit, and a signaller. That
//! lets the exit future own the child outright while `stop` still reaches
//! the process through its pid.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncRead;
use tokio::process::Command;

use crate::errors::{NasJobsError, Result};

use super::command::Invocation;

pub type OutputStream = Pin<Box<dyn AsyncRead + Send>>;
pub type ExitFuture = Pin<Box<dyn Future<Output = std::io::Result<ProcessExit>> + Send>>;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessExit {
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn with_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            Self {
                code: status.code(),
                signal: status.signal(),
            }
        }
        #[cfg(not(unix))]
        {
            Self {
                code: status.code(),
                signal: None,
            }
        }
    }
}

/// Delivers a termination request to a running process.
pub trait ProcessSignaller: Send + Sync {
    fn terminate(&self) -> Result<()>;
}

/// A process that has been started, split into its moving parts.
pub struct SpawnedProcess {
    pub pid: Option<u32>,
    pub stdout: Option<OutputStream>,
    pub stderr: Option<OutputStream>,
    pub exit: ExitFuture,
    pub signaller: Arc<dyn ProcessSignaller>,
}

impl fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Trait abstracting how a job's external tool is started.
///
/// Implementations must not go through a shell: `invocation.args` are
/// passed to the program verbatim.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, invocation: &Invocation) -> std::io::Result<SpawnedProcess>;
}

/// Real spawner used in production.
#[derive(Debug, Clone, Default)]
pub struct TokioSpawner;

impl ProcessSpawner for TokioSpawner {
    fn spawn(&self, invocation: &Invocation) -> std::io::Result<SpawnedProcess> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .map(|s| Box::pin(s) as OutputStream);
        let stderr = child
            .stderr
            .take()
            .map(|s| Box::pin(s) as OutputStream);

        let reaped = Arc::new(AtomicBool::new(false));
        let exit_reaped = Arc::clone(&reaped);
        let exit: ExitFuture = Box::pin(async move {
            let status = child.wait().await;
            exit_reaped.store(true, Ordering::SeqCst);
            status.map(ProcessExit::from_status)
        });

        Ok(SpawnedProcess {
            pid,
            stdout,
            stderr,
            exit,
            signaller: Arc::new(PidSignaller { pid, reaped }),
        })
    }
}

/// Sends SIGTERM to a pid, unless the child has already been reaped (the
/// pid could belong to somebody else by then).
struct PidSignaller {
    pid: Option<u32>,
    reaped: Arc<AtomicBool>,
}

impl ProcessSignaller for PidSignaller {
    fn terminate(&self) -> Result<()> {
        if self.reaped.load(Ordering::SeqCst) {
            return Err(NasJobsError::SignalDelivery(
                "process has already exited".to_string(),
            ));
        }
        let pid = self.pid.ok_or_else(|| {
            NasJobsError::SignalDelivery("process id is not available".to_string())
        })?;
        send_sigterm(pid)
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| NasJobsError::SignalDelivery(format!("pid {pid} out of range")))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM)
        .map_err(|e| NasJobsError::SignalDelivery(format!("SIGTERM to pid {pid}: {e}")))
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> Result<()> {
    Err(NasJobsError::SignalDelivery(
        "signal sending not supported on this platform".to_string(),
    ))
}

// src/exec/supervisor.rs

//! Drives one spawned process to completion.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::backend::{ExitFuture, OutputStream, ProcessExit};
use super::output::{pump, SharedOutput};

/// How long to keep reading after exit. A grandchild that inherited the
/// pipes can keep them open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Exit code reported for a process killed by `signal`, shell style.
const SIGNAL_EXIT_BASE: i32 = 128;

/// What the history entry needs to know about how a process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl Completion {
    pub fn from_exit(exit: std::io::Result<ProcessExit>) -> Self {
        match exit {
            Ok(ProcessExit {
                code: Some(code), ..
            }) => Self {
                exit_code: Some(code),
                error: None,
            },
            Ok(ProcessExit {
                signal: Some(signal),
                ..
            }) => Self {
                exit_code: Some(SIGNAL_EXIT_BASE + signal),
                error: Some(format!("terminated by signal {signal}")),
            },
            Ok(_) => Self {
                exit_code: None,
                error: Some("process exited without a status".to_string()),
            },
            Err(e) => Self {
                exit_code: None,
                error: Some(format!("waiting for process failed: {e}")),
            },
        }
    }
}

/// Pump both output streams into `capture` while waiting for exit.
pub async fn drive(
    label: &str,
    exit: ExitFuture,
    stdout: Option<OutputStream>,
    stderr: Option<OutputStream>,
    capture: &SharedOutput,
) -> Completion {
    let readers: Vec<JoinHandle<std::io::Result<u64>>> = [stdout, stderr]
        .into_iter()
        .flatten()
        .map(|stream| tokio::spawn(pump(stream, capture.clone())))
        .collect();

    let completion = Completion::from_exit(exit.await);

    for mut reader in readers {
        match timeout(DRAIN_TIMEOUT, &mut reader).await {
            Ok(Ok(Ok(bytes))) => debug!(job = %label, bytes, "output stream drained"),
            Ok(Ok(Err(e))) => debug!(job = %label, error = %e, "output stream read error"),
            Ok(Err(e)) => warn!(job = %label, error = %e, "output reader task failed"),
            Err(_) => {
                warn!(job = %label, "output stream still open after exit; abandoning it");
                reader.abort();
            }
        }
    }

    completion
}

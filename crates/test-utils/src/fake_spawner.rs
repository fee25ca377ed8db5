use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tracing::debug;

use nasjobs::errors::{NasJobsError, Result};
use nasjobs::exec::{
    ExitFuture, Invocation, OutputStream, ProcessExit, ProcessSignaller, ProcessSpawner,
    SpawnedProcess,
};

const SIGTERM: i32 = 15;
const PIPE_CAPACITY: usize = 16 * 1024;

/// Lets a test decide when a held fake process exits.
#[derive(Debug, Clone, Default)]
pub struct Gate(Arc<Notify>);

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the process exit. Works even if it has not been spawned yet.
    pub fn open(&self) {
        self.0.notify_one();
    }
}

/// Script for one fake process.
#[derive(Debug, Clone)]
pub struct FakeProcess {
    output: Vec<Vec<u8>>,
    chunk_delay: Option<Duration>,
    exit: ProcessExit,
    gate: Option<Gate>,
    spawn_error: Option<io::ErrorKind>,
    ignore_terminate: bool,
}

impl FakeProcess {
    /// Writes nothing and exits with `code` straight away.
    pub fn exits(code: i32) -> Self {
        Self {
            output: vec![],
            chunk_delay: None,
            exit: ProcessExit::with_code(code),
            gate: None,
            spawn_error: None,
            ignore_terminate: false,
        }
    }

    /// Spawning fails, like a missing executable.
    pub fn fails_to_spawn(kind: io::ErrorKind) -> Self {
        Self {
            spawn_error: Some(kind),
            ..Self::exits(0)
        }
    }

    /// Ends through `signal` instead of an exit code.
    pub fn killed_by(signal: i32) -> Self {
        Self {
            exit: ProcessExit::with_signal(signal),
            ..Self::exits(0)
        }
    }

    /// Append one chunk of stdout.
    pub fn output(mut self, chunk: impl Into<Vec<u8>>) -> Self {
        self.output.push(chunk.into());
        self
    }

    /// Sleep between chunks, so the output trickles in.
    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Do not exit until `gate` is opened (or the process is terminated).
    pub fn held(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    /// Accept SIGTERM but keep running.
    pub fn ignore_terminate(mut self) -> Self {
        self.ignore_terminate = true;
        self
    }
}

impl Default for FakeProcess {
    fn default() -> Self {
        Self::exits(0)
    }
}

#[derive(Debug)]
struct FakeState {
    queue: VecDeque<FakeProcess>,
    fallback: FakeProcess,
    invocations: Vec<Invocation>,
    next_pid: u32,
}

/// A fake spawner that:
/// - records every invocation it was asked to start
/// - plays back queued `FakeProcess` scripts in order, then the fallback
/// - turns `terminate()` into a SIGTERM exit unless told to ignore it
#[derive(Debug, Clone)]
pub struct FakeSpawner {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSpawner {
    /// Every process exits 0 unless a script is queued.
    pub fn new() -> Self {
        Self::with_fallback(FakeProcess::exits(0))
    }

    pub fn with_fallback(fallback: FakeProcess) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                queue: VecDeque::new(),
                fallback,
                invocations: vec![],
                next_pid: 40_000,
            })),
        }
    }

    /// Use `process` for the next spawn.
    pub fn push(&self, process: FakeProcess) {
        self.state.lock().unwrap().queue.push_back(process);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().invocations.clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().invocations.len()
    }
}

impl Default for FakeSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, invocation: &Invocation) -> io::Result<SpawnedProcess> {
        let (script, pid) = {
            let mut state = self.state.lock().unwrap();
            state.invocations.push(invocation.clone());
            let script = state
                .queue
                .pop_front()
                .unwrap_or_else(|| state.fallback.clone());
            state.next_pid += 1;
            (script, state.next_pid)
        };

        if let Some(kind) = script.spawn_error {
            debug!(program = %invocation.program, "fake spawn failure");
            return Err(io::Error::new(kind, "scripted spawn failure"));
        }

        let (reader, mut writer) = tokio::io::duplex(PIPE_CAPACITY);
        let chunks = script.output.clone();
        let delay = script.chunk_delay;
        let mut writer_task = tokio::spawn(async move {
            for chunk in chunks {
                if writer.write_all(&chunk).await.is_err() {
                    return;
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
            }
            let _ = writer.shutdown().await;
        });

        let terminate = Arc::new(Notify::new());
        let exited = Arc::new(AtomicBool::new(false));

        let exit: ExitFuture = {
            let terminate = Arc::clone(&terminate);
            let exited = Arc::clone(&exited);
            let gate = script.gate.clone();
            let scripted_exit = script.exit;
            let ignore_terminate = script.ignore_terminate;

            Box::pin(async move {
                let outcome = {
                    let finished = async {
                        let _ = (&mut writer_task).await;
                        if let Some(gate) = &gate {
                            gate.0.notified().await;
                        }
                        scripted_exit
                    };

                    if ignore_terminate {
                        finished.await
                    } else {
                        tokio::select! {
                            exit = finished => exit,
                            _ = terminate.notified() => ProcessExit::with_signal(SIGTERM),
                        }
                    }
                };

                // A terminated writer closes the pipe.
                writer_task.abort();
                exited.store(true, Ordering::SeqCst);
                Ok(outcome)
            })
        };

        Ok(SpawnedProcess {
            pid: Some(pid),
            stdout: Some(Box::pin(reader) as OutputStream),
            stderr: None,
            exit,
            signaller: Arc::new(FakeSignaller {
                terminate,
                exited,
                ignore: script.ignore_terminate,
            }),
        })
    }
}

struct FakeSignaller {
    terminate: Arc<Notify>,
    exited: Arc<AtomicBool>,
    ignore: bool,
}

impl ProcessSignaller for FakeSignaller {
    fn terminate(&self) -> Result<()> {
        if self.exited.load(Ordering::SeqCst) {
            return Err(NasJobsError::SignalDelivery(
                "process has already exited".to_string(),
            ));
        }
        if !self.ignore {
            self.terminate.notify_one();
        }
        Ok(())
    }
}

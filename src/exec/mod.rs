// src/exec/mod.rs

//! Process execution layer.
//!
//! This module knows how to start the external transfer tools and watch
//! them; it knows nothing about jobs being stored or tracked.
//!
//! - [`backend`] provides the `ProcessSpawner` trait and the production
//!   `TokioSpawner`; tests swap in a scripted fake.
//! - [`command`] turns a job target into a literal argument vector.
//! - [`output`] holds the bounded live/history output buffers.
//! - [`supervisor`] pumps output and waits for exit.

pub mod backend;
pub mod command;
pub mod output;
pub mod supervisor;

pub use backend::{
    ExitFuture, OutputStream, ProcessExit, ProcessSignaller, ProcessSpawner, SpawnedProcess,
    TokioSpawner,
};
pub use command::{archive_file_name, build_invocation, Invocation, ToolPaths};
pub use output::{OutputCapture, OutputLimits, RollingBuffer, SharedOutput};
pub use supervisor::{drive, Completion};

// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::JobKind;

/// Command-line arguments for `nasjobs`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nasjobs",
    version,
    about = "Run, supervise and recover NAS backup and sync jobs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `NASJOBS_CONFIG`, or `Nasjobs.toml` in the current working
    /// directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NASJOBS_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Recover interrupted runs, then keep supervising them until Ctrl-C.
    Serve,
    /// Recover interrupted runs and wait for the relaunched processes.
    Recover,
    /// List all jobs.
    List,
    /// Show one job definition.
    Show { id: String },
    /// Create a job.
    Create(CreateArgs),
    /// Change fields of an existing job.
    Update(UpdateArgs),
    /// Delete a job that is not running.
    Delete { id: String },
    /// Run a job now and wait for it to finish.
    Run { id: String },
    /// Show whether a job is idle, running or finished.
    Status { id: String },
    /// Show a job's recorded executions, newest first.
    History { id: String },
    /// Print crontab lines for every enabled schedule.
    Crontab {
        /// Command prefix used in each line (defaults to this executable).
        #[arg(long, value_name = "CMD")]
        program: Option<String>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub source: String,
    #[arg(long)]
    pub destination: String,
    #[arg(long, value_parser = parse_kind)]
    pub kind: JobKind,
    /// 5-field cron expression; enables the schedule.
    #[arg(long, value_name = "EXPR")]
    pub cron: Option<String>,
    /// Exclude pattern (repeatable).
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub excludes: Vec<String>,
    #[arg(long, value_name = "N")]
    pub keep_last: Option<u32>,
}

#[derive(Debug, Clone, Args)]
pub struct UpdateArgs {
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub source: Option<String>,
    #[arg(long)]
    pub destination: Option<String>,
    #[arg(long, value_parser = parse_kind)]
    pub kind: Option<JobKind>,
    #[arg(long, value_name = "EXPR", conflicts_with = "disable_schedule")]
    pub cron: Option<String>,
    /// Keep the cron expression but stop scheduling.
    #[arg(long)]
    pub disable_schedule: bool,
    /// Replace all exclude patterns (repeatable).
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub excludes: Option<Vec<String>>,
    #[arg(long, value_name = "N")]
    pub keep_last: Option<u32>,
}

fn parse_kind(s: &str) -> Result<JobKind, String> {
    s.parse()
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

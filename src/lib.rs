// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod guard;
pub mod job;
pub mod logging;
pub mod store;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, CreateArgs, UpdateArgs};
use crate::config::loader::{default_config_path, load_and_validate};
use crate::engine::{Engine, JobStatus, RecoveryReport, RunOutcome, StopOutcome};
use crate::exec::TokioSpawner;
use crate::fs::RealFileSystem;
use crate::guard::crontab_line;
use crate::job::{HistoryEntry, Job, JobPatch, JobSpec, Retention, Schedule};

/// How long `serve` waits for stopped processes to be recorded on Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - job store / runner / recovery
/// - the real process spawner
/// - Ctrl-C handling for long-running commands
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    debug!(?cfg, "configuration loaded");

    let engine = Engine::open(&cfg, Arc::new(RealFileSystem), Arc::new(TokioSpawner)).await?;
    let json = args.json;

    match args.command {
        Command::Serve => serve(&engine, json).await,
        Command::Recover => {
            let report = engine.recover().await?;
            print_report(&report, json)?;
            wait_for_resumed(report).await;
            Ok(())
        }
        Command::List => {
            let jobs = engine.list_jobs().await?;
            if json {
                return print_json(&jobs);
            }
            for job in &jobs {
                println!(
                    "{}  {:<14} {:<8} {}",
                    job.id, job.kind, job.last_result, job.name
                );
            }
            Ok(())
        }
        Command::Show { id } => {
            let job = engine.store().require_job(&id).await?;
            print_job(&job, json)
        }
        Command::Create(create) => {
            let job = engine.create_job(spec_from_args(create)).await?;
            print_job(&job, json)
        }
        Command::Update(update) => {
            let id = update.id.clone();
            let patch = patch_from_args(&engine, update).await?;
            let job = engine.update_job(&id, patch).await?;
            print_job(&job, json)
        }
        Command::Delete { id } => {
            let job = engine.delete_job(&id).await?;
            if json {
                return print_json(&job);
            }
            println!("deleted {} ({})", job.id, job.name);
            Ok(())
        }
        Command::Run { id } => run_once(&engine, &id, json).await,
        Command::Status { id } => {
            let status = engine.status(&id).await?;
            if json {
                return print_json(&status);
            }
            print_status(&status);
            Ok(())
        }
        Command::History { id } => {
            let history = engine.history(&id).await?;
            if json {
                return print_json(&history);
            }
            for entry in &history {
                print_entry(entry);
            }
            Ok(())
        }
        Command::Crontab { program } => {
            let program = match program {
                Some(p) => p,
                None => std::env::current_exe()
                    .context("resolving current executable")?
                    .display()
                    .to_string(),
            };
            let config = std::path::absolute(&config_path)
                .unwrap_or_else(|_| config_path.clone())
                .display()
                .to_string();
            for job in engine.list_jobs().await? {
                if job.schedule.enabled && !job.schedule.cron.trim().is_empty() {
                    println!(
                        "{}",
                        crontab_line(&job.schedule.cron, &program, Some(&config), &job.id)
                    );
                }
            }
            Ok(())
        }
    }
}

/// Recover, then keep the relaunched processes supervised until they end
/// or Ctrl-C arrives.
async fn serve(engine: &Engine, json: bool) -> Result<()> {
    let report = engine.recover().await?;
    print_report(&report, json)?;

    info!("serving; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("shutdown requested");

    for record in engine.runner().running() {
        if let StopOutcome::Stopped { execution_id, .. } = engine.stop(&record.job_id) {
            info!(job = %record.job_id, execution = %execution_id, "stopped for shutdown");
        }
    }

    if tokio::time::timeout(SHUTDOWN_GRACE, wait_for_resumed(report))
        .await
        .is_err()
    {
        warn!("some processes did not finish in time; they will be recovered on next start");
    }
    Ok(())
}

async fn wait_for_resumed(report: RecoveryReport) {
    let mut waits = JoinSet::new();
    for resumed in report.resumed {
        if let RunOutcome::Started(handle) = resumed.outcome {
            waits.spawn(handle.wait());
        }
    }
    while let Some(joined) = waits.join_next().await {
        match joined {
            Ok(Ok(entry)) => debug!(execution = %entry.id, status = %entry.status, "relaunched run finished"),
            Ok(Err(e)) => warn!(error = %e, "relaunched run could not be awaited"),
            Err(e) => warn!(error = %e, "wait task failed"),
        }
    }
}

/// Run one job in the foreground. Ctrl-C stops the process; its result is
/// still recorded. Fails if the execution did not succeed.
async fn run_once(engine: &Engine, id: &str, json: bool) -> Result<()> {
    let handle = match engine.run(id).await? {
        RunOutcome::Started(handle) => handle,
        RunOutcome::SpawnFailed(entry) => {
            print_history_result(&entry, json)?;
            bail!(
                "job {id} could not be started: {}",
                entry.error.as_deref().unwrap_or("unknown error")
            );
        }
    };

    let execution = handle.execution_id.clone();
    let wait = handle.wait();
    tokio::pin!(wait);

    let entry = tokio::select! {
        entry = &mut wait => entry?,
        _ = tokio::signal::ctrl_c() => {
            info!(job = %id, execution = %execution, "interrupted; stopping job");
            engine.stop(id);
            wait.await?
        }
    };

    print_history_result(&entry, json)?;
    if !entry.success {
        bail!("job {id} failed (execution {})", entry.id);
    }
    Ok(())
}

fn spec_from_args(args: CreateArgs) -> JobSpec {
    JobSpec {
        name: args.name,
        source: args.source,
        destination: args.destination,
        kind: args.kind,
        schedule: match args.cron {
            Some(cron) => Schedule {
                enabled: true,
                cron,
            },
            None => Schedule::default(),
        },
        excludes: args.excludes,
        retention: args
            .keep_last
            .map(|keep_last| Retention { keep_last })
            .unwrap_or_default(),
    }
}

async fn patch_from_args(engine: &Engine, args: UpdateArgs) -> Result<JobPatch> {
    let schedule = match (args.cron, args.disable_schedule) {
        (Some(cron), _) => Some(Schedule {
            enabled: true,
            cron,
        }),
        (None, true) => {
            let job = engine.store().require_job(&args.id).await?;
            Some(Schedule {
                enabled: false,
                cron: job.schedule.cron,
            })
        }
        (None, false) => None,
    };

    let patch = JobPatch {
        name: args.name,
        source: args.source,
        destination: args.destination,
        kind: args.kind,
        schedule,
        excludes: args.excludes,
        retention: args.keep_last.map(|keep_last| Retention { keep_last }),
    };
    if patch.is_empty() {
        bail!("nothing to update: pass at least one field");
    }
    Ok(patch)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_job(job: &Job, json: bool) -> Result<()> {
    if json {
        return print_json(job);
    }
    println!("id:          {}", job.id);
    println!("name:        {}", job.name);
    println!("kind:        {}", job.kind);
    println!("source:      {}", job.source);
    println!("destination: {}", job.destination);
    if !job.schedule.cron.is_empty() {
        let state = if job.schedule.enabled { "enabled" } else { "disabled" };
        println!("schedule:    {} ({state})", job.schedule.cron);
    }
    if !job.excludes.is_empty() {
        println!("excludes:    {:?}", job.excludes);
    }
    println!("keep last:   {}", job.retention.keep_last);
    println!("last result: {}", job.last_result);
    if let Some(last_run) = job.last_run {
        println!("last run:    {}", last_run.to_rfc3339());
    }
    Ok(())
}

fn print_status(status: &JobStatus) {
    match status {
        JobStatus::Idle => println!("idle (never run)"),
        JobStatus::Running {
            execution_id,
            started_at,
            pid,
            output,
            output_bytes,
        } => {
            println!("running: execution {execution_id} since {}", started_at.to_rfc3339());
            if let Some(pid) = pid {
                println!("pid: {pid}");
            }
            println!("output ({output_bytes} bytes so far):");
            print!("{output}");
        }
        JobStatus::Terminal {
            last_result,
            last_run,
        } => {
            let at = last_run.map(|t| t.to_rfc3339()).unwrap_or_default();
            println!("{last_result} {at}");
        }
    }
}

fn print_entry(entry: &HistoryEntry) {
    let code = entry
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    print!(
        "{}  {:<8} exit={code:<4} started={}",
        entry.id,
        entry.status,
        entry.started_at.to_rfc3339()
    );
    if let Some(from) = &entry.resumed_from {
        print!(" resumedFrom={from}");
    }
    if let Some(to) = &entry.resumed_as {
        print!(" resumedAs={to}");
    }
    if let Some(error) = &entry.error {
        print!(" error={error:?}");
    }
    println!();
}

fn print_history_result(entry: &HistoryEntry, json: bool) -> Result<()> {
    if json {
        return print_json(entry);
    }
    print_entry(entry);
    if !entry.output.is_empty() {
        print!("{}", entry.output);
        if !entry.output.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn print_report(report: &RecoveryReport, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "resumed": report.resumed.iter().map(|r| serde_json::json!({
                "jobId": r.job_id,
                "resumedFrom": r.original_execution_id,
                "executionId": r.outcome.execution_id(),
                "started": matches!(r.outcome, RunOutcome::Started(_)),
            })).collect::<Vec<_>>(),
            "failed": report.failed.iter().map(|f| serde_json::json!({
                "jobId": f.job_id,
                "executionId": f.execution_id,
                "reason": f.reason,
            })).collect::<Vec<_>>(),
            "liveElsewhere": report.live_elsewhere,
            "errors": report.errors,
        });
        return print_json(&value);
    }

    if report.is_empty() {
        println!("recovery: nothing to do");
        return Ok(());
    }
    for r in &report.resumed {
        println!(
            "resumed  {} {} -> {}",
            r.job_id,
            r.original_execution_id,
            r.outcome.execution_id()
        );
    }
    for f in &report.failed {
        println!("failed   {} {}: {}", f.job_id, f.execution_id, f.reason);
    }
    for job_id in &report.live_elsewhere {
        println!("skipped  {job_id}: running in another process");
    }
    for e in &report.errors {
        println!("error    {e}");
    }
    Ok(())
}

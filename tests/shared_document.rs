// tests/shared_document.rs
//
// Several engines on one document stand in for several `nasjobs`
// processes (a `serve` plus crontab-started `run`s).

mod common;

use std::error::Error;

use nasjobs::engine::{RunHandle, RunOutcome};
use nasjobs::errors::NasJobsError;
use nasjobs::fs::{FileSystem, RealFileSystem};
use nasjobs::types::RunStatus;
use nasjobs_test_utils::fake_spawner::{FakeProcess, FakeSpawner, Gate};
use nasjobs_test_utils::{init_tracing, with_timeout};

use common::Fixture;

type TestResult = Result<(), Box<dyn Error>>;

fn started(outcome: RunOutcome) -> RunHandle {
    match outcome {
        RunOutcome::Started(handle) => handle,
        RunOutcome::SpawnFailed(entry) => panic!("expected a started run, got {entry:?}"),
    }
}

#[test]
fn file_locks_exclude_each_other_until_dropped() -> TestResult {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("locks").join("job.lock");
    let fs = RealFileSystem;

    let held = fs.try_lock_exclusive(&path)?.expect("first lock is free");
    assert_eq!(held.path(), path.as_path());
    assert!(fs.try_lock_exclusive(&path)?.is_none());

    drop(held);
    assert!(fs.try_lock_exclusive(&path)?.is_some());

    Ok(())
}

#[tokio::test]
async fn engines_on_one_document_keep_each_others_history() -> TestResult {
    init_tracing();
    let fx = Fixture::new().await;
    let a = fx.engine.create_job(fx.mirror_spec("a")).await?;
    let b = fx.engine.create_job(fx.mirror_spec("b")).await?;

    let other_spawner = FakeSpawner::new();
    let other = fx.restart(&other_spawner).await;

    let gate_a = Gate::new();
    let gate_b = Gate::new();
    fx.spawner.push(FakeProcess::exits(0).held(&gate_a));
    other_spawner.push(FakeProcess::exits(1).held(&gate_b));

    let run_a = started(fx.engine.run(&a.id).await?);
    let run_b = started(other.run(&b.id).await?);

    gate_b.open();
    with_timeout(run_b.wait()).await?;
    gate_a.open();
    with_timeout(run_a.wait()).await?;

    let reopened = fx.restart(&FakeSpawner::new()).await;
    let history_a = reopened.history(&a.id).await?;
    let history_b = reopened.history(&b.id).await?;
    assert_eq!(history_a.len(), 1);
    assert_eq!(history_a[0].status, RunStatus::Success);
    assert_eq!(history_b.len(), 1);
    assert_eq!(history_b[0].status, RunStatus::Failed);

    Ok(())
}

#[tokio::test]
async fn jobs_created_by_one_engine_are_seen_by_another() -> TestResult {
    init_tracing();
    let fx = Fixture::new().await;
    let other = fx.restart(&FakeSpawner::new()).await;

    let job = other.create_job(fx.mirror_spec("late")).await?;
    assert_eq!(fx.engine.get_job(&job.id).await?, Some(job));

    Ok(())
}

#[tokio::test]
async fn job_running_in_one_engine_is_refused_by_another() -> TestResult {
    init_tracing();
    let fx = Fixture::new().await;
    let job = fx.engine.create_job(fx.mirror_spec("busy")).await?;

    let gate = Gate::new();
    fx.spawner.push(FakeProcess::exits(0).held(&gate));
    let handle = started(fx.engine.run(&job.id).await?);

    let other_spawner = FakeSpawner::new();
    let other = fx.restart(&other_spawner).await;

    let err = other.run(&job.id).await.expect_err("second run must be refused");
    assert!(matches!(err, NasJobsError::Conflict(_)), "got {err:?}");
    assert!(!other.runner().is_running(&job.id));

    let err = other.delete_job(&job.id).await.expect_err("delete must be refused");
    assert!(matches!(err, NasJobsError::Conflict(_)), "got {err:?}");
    assert_eq!(other_spawner.spawn_count(), 0);

    gate.open();
    with_timeout(handle.wait()).await?;

    // The lock went with the process.
    let again = started(other.run(&job.id).await?);
    with_timeout(again.wait()).await?;
    assert_eq!(other_spawner.spawn_count(), 1);

    Ok(())
}

#[tokio::test]
async fn recovery_leaves_runs_of_another_engine_alone() -> TestResult {
    init_tracing();
    let fx = Fixture::new().await;
    let job = fx.engine.create_job(fx.mirror_spec("elsewhere")).await?;

    let gate = Gate::new();
    fx.spawner.push(FakeProcess::exits(0).held(&gate));
    let handle = started(fx.engine.run(&job.id).await?);

    let other_spawner = FakeSpawner::new();
    let other = fx.restart(&other_spawner).await;
    let report = other.recover().await?;

    assert!(report.resumed.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.live_elsewhere, vec![job.id.clone()]);
    assert_eq!(other_spawner.spawn_count(), 0);

    let history = other.history(&job.id).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, handle.execution_id);
    assert_eq!(history[0].status, RunStatus::Running);

    gate.open();
    with_timeout(handle.wait()).await?;
    assert!(other.recover().await?.is_empty());

    Ok(())
}

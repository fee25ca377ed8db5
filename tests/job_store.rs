// tests/job_store.rs

use std::error::Error;
use std::sync::Arc;

use chrono::Utc;

use nasjobs::errors::NasJobsError;
use nasjobs::fs::{FileSystem, MockFileSystem};
use nasjobs::guard::PathValidator;
use nasjobs::job::{HistoryEntry, JobPatch, JobValidator, Retention, Schedule};
use nasjobs::store::{document_lock_path, Document, JobStore};
use nasjobs::types::{JobKind, LastResult, RunStatus};
use nasjobs_test_utils::builders::JobSpecBuilder;
use nasjobs_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const ROOT: &str = "/mnt/storage";
const DOC: &str = "/etc/nasjobs/config.json";

fn mock_fs() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_dir("/mnt/storage/photos");
    fs.add_dir("/mnt/storage/backup");
    fs.add_dir("/etc/nasjobs");
    fs
}

async fn open(fs: &MockFileSystem) -> JobStore {
    let fs: Arc<dyn FileSystem> = Arc::new(fs.clone());
    let validator = JobValidator::new(PathValidator::new(ROOT, Arc::clone(&fs)));
    JobStore::open(DOC, fs, validator).await.expect("open store")
}

fn finished(id: &str, exit_code: i32) -> HistoryEntry {
    let target = nasjobs::job::Target {
        source: "/mnt/storage/photos".to_string(),
        destination: "/mnt/storage/backup".to_string(),
        kind: JobKind::LocalMirror,
    };
    let now = Utc::now();
    HistoryEntry::running(id, target, now, None).finish(now, Some(exit_code), None, String::new())
}

fn photos_spec() -> JobSpecBuilder {
    JobSpecBuilder::new("photos", "/mnt/storage/photos", "/mnt/storage/backup")
}

#[tokio::test]
async fn create_persists_job_and_survives_reopen() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;

    let job = store.create_job(photos_spec().cron("0 3 * * *").build()).await?;
    assert!(!job.id.is_empty());
    assert_eq!(job.last_result, LastResult::None);
    assert!(job.history.is_empty());
    assert!(job.created_at.is_some());

    let raw = fs.contents(DOC).expect("document written");
    let value: serde_json::Value = serde_json::from_slice(&raw)?;
    assert_eq!(value["backupJobs"][0]["id"], job.id.as_str());
    assert_eq!(value["backupJobs"][0]["kind"], "local-mirror");
    assert_eq!(value["backupJobs"][0]["retention"]["keepLast"], 10);

    let reopened = open(&fs).await;
    assert_eq!(reopened.list_jobs().await?, vec![job]);

    Ok(())
}

#[tokio::test]
async fn source_outside_root_is_rejected_and_nothing_is_written() {
    init_tracing();
    let fs = mock_fs();
    fs.add_dir("/home/user");
    let store = open(&fs).await;

    for source in ["/home/user", "relative/path", "", "/mnt/storage/../../home/user"] {
        let spec = JobSpecBuilder::new("escape", source, "/mnt/storage/backup").build();
        let result = store.create_job(spec).await;
        assert!(
            matches!(result, Err(NasJobsError::Validation(_))),
            "source {source:?} should be rejected, got {result:?}"
        );
    }

    assert!(store.list_jobs().await.unwrap().is_empty());
    assert_eq!(fs.write_count(), 0);
}

#[tokio::test]
async fn invalid_fields_are_validation_errors() {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;

    let cases = vec![
        ("empty name", JobSpecBuilder::new("  ", "/mnt/storage/photos", "/mnt/storage/backup").build()),
        ("bad cron", photos_spec().cron("every night").build()),
        ("six-field cron", photos_spec().cron("0 0 3 * * *").build()),
        ("zero keepLast", photos_spec().keep_last(0).build()),
        ("empty exclude", photos_spec().exclude("").build()),
        ("bad glob", photos_spec().exclude("photos/[").build()),
        (
            "remote kind with local destination",
            photos_spec().kind(JobKind::RemoteSync).build(),
        ),
        (
            "remote name that looks like a flag",
            photos_spec()
                .kind(JobKind::RemoteCopy)
                .destination("-rf:bucket")
                .build(),
        ),
    ];

    for (label, spec) in cases {
        let result = store.create_job(spec).await;
        assert!(
            matches!(result, Err(NasJobsError::Validation(_))),
            "{label}: expected validation error, got {result:?}"
        );
    }
    assert_eq!(fs.write_count(), 0);
}

#[tokio::test]
async fn remote_kinds_accept_remote_destinations() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;

    let job = store
        .create_job(
            photos_spec()
                .kind(JobKind::RemoteCopy)
                .destination("b2:nas-backup/photos")
                .build(),
        )
        .await?;
    assert_eq!(job.destination, "b2:nas-backup/photos");

    Ok(())
}

#[tokio::test]
async fn disabled_schedule_may_have_empty_cron() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;

    let job = store.create_job(photos_spec().build()).await?;
    assert_eq!(job.schedule, Schedule::default());

    Ok(())
}

#[tokio::test]
async fn update_applies_patch_and_revalidates() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;
    let job = store.create_job(photos_spec().build()).await?;

    let updated = store
        .update_job(
            &job.id,
            JobPatch {
                name: Some("photos nightly".to_string()),
                schedule: Some(Schedule {
                    enabled: true,
                    cron: "@daily".to_string(),
                }),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.name, "photos nightly");
    assert!(updated.schedule.enabled);
    assert_eq!(updated.source, job.source);

    let rejected = store
        .update_job(
            &job.id,
            JobPatch {
                destination: Some("/tmp".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(rejected, Err(NasJobsError::Validation(_))));
    assert_eq!(store.require_job(&job.id).await?, updated);

    let missing = store.update_job("nope", JobPatch::default()).await;
    assert!(matches!(missing, Err(NasJobsError::JobNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn lowering_keep_last_prunes_existing_history() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;
    let job = store.create_job(photos_spec().build()).await?;

    for i in 0..6 {
        store.add_history(&job.id, finished(&format!("run-{i}"), 0)).await?;
    }

    let updated = store
        .update_job(
            &job.id,
            JobPatch {
                retention: Some(Retention { keep_last: 2 }),
                ..Default::default()
            },
        )
        .await?;
    let ids: Vec<&str> = updated.history.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["run-5", "run-4"]);

    Ok(())
}

#[tokio::test]
async fn add_history_keeps_newest_first_and_mirrors_head() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;
    let job = store.create_job(photos_spec().keep_last(3).build()).await?;

    assert!(store.add_history(&job.id, finished("a", 0)).await?);
    assert!(store.add_history(&job.id, finished("b", 1)).await?);

    let stored = store.require_job(&job.id).await?;
    assert_eq!(stored.history[0].id, "b");
    assert_eq!(stored.last_result, LastResult::Failed);
    assert_eq!(stored.last_run, stored.history[0].finished_at);

    assert!(store.add_history(&job.id, finished("c", 0)).await?);
    assert!(store.add_history(&job.id, finished("d", 0)).await?);

    let stored = store.require_job(&job.id).await?;
    let ids: Vec<&str> = stored.history.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["d", "c", "b"]);
    assert_eq!(stored.last_result, LastResult::Success);

    Ok(())
}

#[tokio::test]
async fn running_head_leaves_summary_untouched() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;
    let job = store.create_job(photos_spec().build()).await?;

    store.add_history(&job.id, finished("done", 0)).await?;
    let before = store.require_job(&job.id).await?;

    let running = HistoryEntry::running("live", job.target(), Utc::now(), None);
    store.add_history(&job.id, running).await?;

    let after = store.require_job(&job.id).await?;
    assert_eq!(after.history[0].status, RunStatus::Running);
    assert_eq!(after.last_result, before.last_result);
    assert_eq!(after.last_run, before.last_run);

    Ok(())
}

#[tokio::test]
async fn add_history_for_deleted_job_returns_false() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;
    let job = store.create_job(photos_spec().build()).await?;

    let removed = store.delete_job(&job.id).await?;
    assert_eq!(removed.id, job.id);

    assert!(!store.add_history(&job.id, finished("late", 0)).await?);
    assert!(store.list_jobs().await?.is_empty());

    let again = store.delete_job(&job.id).await;
    assert!(matches!(again, Err(NasJobsError::JobNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn failed_write_leaves_memory_and_file_unchanged() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;
    let job = store.create_job(photos_spec().build()).await?;
    let on_disk = fs.contents(DOC);

    fs.fail_writes(true);
    let result = store.create_job(photos_spec().build()).await;
    assert!(result.is_err());
    let result = store.add_history(&job.id, finished("x", 0)).await;
    assert!(result.is_err());

    assert_eq!(store.list_jobs().await?, vec![job.clone()]);
    assert_eq!(fs.contents(DOC), on_disk);

    fs.fail_writes(false);
    store.create_job(photos_spec().build()).await?;
    assert_eq!(store.list_jobs().await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn unrelated_document_keys_are_preserved() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    fs.add_file(
        DOC,
        r#"{ "storageRoot": "/mnt/storage", "users": [{ "name": "admin" }], "backupJobs": [] }"#,
    );
    let store = open(&fs).await;

    store.create_job(photos_spec().build()).await?;

    let value: serde_json::Value = serde_json::from_slice(&fs.contents(DOC).expect("written"))?;
    assert_eq!(value["storageRoot"], "/mnt/storage");
    assert_eq!(value["users"][0]["name"], "admin");
    assert_eq!(value["backupJobs"].as_array().map(Vec::len), Some(1));

    Ok(())
}

#[tokio::test]
async fn missing_or_blank_document_is_empty() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    assert!(Document::load(&fs, DOC.as_ref())?.jobs.is_empty());

    fs.add_file(DOC, "  \n");
    let store = open(&fs).await;
    assert!(store.list_jobs().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn corrupt_document_fails_to_open() {
    init_tracing();
    let fs = mock_fs();
    fs.add_file(DOC, "{ not json");

    let fs_dyn: Arc<dyn FileSystem> = Arc::new(fs.clone());
    let validator = JobValidator::new(PathValidator::new(ROOT, Arc::clone(&fs_dyn)));
    let result = JobStore::open(DOC, fs_dyn, validator).await;
    assert!(matches!(result, Err(NasJobsError::JsonError(_))));
}

#[tokio::test]
async fn entries_without_target_snapshot_still_load() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    fs.add_file(
        DOC,
        r#"{
  "backupJobs": [{
    "id": "legacy",
    "name": "old job",
    "source": "/mnt/storage/photos",
    "destination": "/mnt/storage/backup",
    "kind": "local-mirror",
    "history": [{
      "id": "exec-1",
      "status": "success",
      "startedAt": "2024-05-01T03:00:00Z",
      "finishedAt": "2024-05-01T03:05:00Z",
      "success": true,
      "exitCode": 0
    }],
    "lastResult": "success"
  }]
}"#,
    );
    let store = open(&fs).await;

    let job = store.require_job("legacy").await?;
    assert_eq!(job.retention.keep_last, 10);
    assert_eq!(job.history[0].target, None);
    assert_eq!(job.history[0].output, "");
    assert_eq!(job.last_result, LastResult::Success);

    Ok(())
}

#[tokio::test]
async fn stores_sharing_a_document_do_not_lose_writes() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let first = open(&fs).await;
    let second = open(&fs).await;

    let photos = first.create_job(photos_spec().build()).await?;
    let music = second
        .create_job(JobSpecBuilder::new("music", "/mnt/storage/photos", "/mnt/storage/backup").build())
        .await?;

    assert!(first.add_history(&photos.id, finished("p-1", 0)).await?);
    assert!(second.add_history(&music.id, finished("m-1", 2)).await?);

    let reopened = open(&fs).await;
    let jobs = reopened.list_jobs().await?;
    assert_eq!(jobs.len(), 2);
    assert_eq!(reopened.history(&photos.id).await?[0].id, "p-1");
    assert_eq!(reopened.history(&music.id).await?[0].id, "m-1");

    // Each handle sees the other's changes without reopening.
    assert_eq!(first.history(&music.id).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn document_lock_is_released_after_each_mutation() -> TestResult {
    init_tracing();
    let fs = mock_fs();
    let store = open(&fs).await;
    let lock = document_lock_path(std::path::Path::new(DOC));
    assert_eq!(lock, std::path::Path::new("/etc/nasjobs/.config.json.lock"));

    let job = store.create_job(photos_spec().build()).await?;
    assert!(!fs.is_locked(&lock));

    fs.fail_writes(true);
    assert!(store.add_history(&job.id, finished("x", 0)).await.is_err());
    assert!(!fs.is_locked(&lock));

    Ok(())
}

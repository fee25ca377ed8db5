// tests/job_model.rs

use chrono::{Duration, TimeZone, Utc};

use nasjobs::job::{HistoryEntry, Job, JobPatch, Target};
use nasjobs::types::{JobKind, LastResult, RunStatus};
use nasjobs_test_utils::builders::JobSpecBuilder;

fn target() -> Target {
    Target {
        source: "/mnt/storage/a".to_string(),
        destination: "/mnt/storage/b".to_string(),
        kind: JobKind::LocalMirror,
    }
}

#[test]
fn finish_with_zero_exit_is_success() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap();
    let running = HistoryEntry::running("e1", target(), start, Some("e0".to_string()));
    let done = running.finish(start + Duration::seconds(30), Some(0), None, "ok\n".to_string());

    assert!(done.success);
    assert_eq!(done.status, RunStatus::Success);
    assert_eq!(done.started_at, start);
    assert_eq!(done.resumed_from.as_deref(), Some("e0"));
    assert_eq!(done.target, Some(target()));
}

#[test]
fn failed_entries_always_carry_a_code_or_error() {
    let start = Utc::now();
    let running = HistoryEntry::running("e1", target(), start, None);

    let non_zero = running.finish(start, Some(2), None, String::new());
    assert!(!non_zero.success);
    assert_eq!(non_zero.exit_code, Some(2));

    let no_code = running.finish(start, None, None, String::new());
    assert!(!no_code.success);
    assert!(no_code.error.is_some());

    let zero_with_error = running.finish(start, Some(0), Some("boom".to_string()), String::new());
    assert!(!zero_with_error.success);
    assert_eq!(zero_with_error.status, RunStatus::Failed);
}

#[test]
fn summary_follows_terminal_head_only() {
    let spec = JobSpecBuilder::new("j", "/mnt/storage/a", "/mnt/storage/b").build();
    let now = Utc::now();
    let mut job = Job::from_spec(spec, now);
    job.refresh_summary();
    assert_eq!(job.last_result, LastResult::None);
    assert_eq!(job.last_run, None);

    let failed = HistoryEntry::running("f", target(), now, None).finish(now, Some(1), None, String::new());
    job.history.insert(0, failed.clone());
    job.refresh_summary();
    assert_eq!(job.last_result, LastResult::Failed);
    assert_eq!(job.last_run, failed.finished_at);

    job.history
        .insert(0, HistoryEntry::running("r", target(), now + Duration::seconds(5), None));
    job.refresh_summary();
    assert_eq!(job.last_result, LastResult::Failed);
    assert_eq!(job.last_run, failed.finished_at);
}

#[test]
fn patch_only_touches_given_fields() {
    let spec = JobSpecBuilder::new(" photos ", "/mnt/storage/a", "/mnt/storage/b").build();
    let created = Utc::now();
    let mut job = Job::from_spec(spec, created);
    assert_eq!(job.name, "photos");

    let later = created + Duration::minutes(1);
    job.apply_patch(
        JobPatch {
            kind: Some(JobKind::LocalArchive),
            excludes: Some(vec!["*.tmp".to_string()]),
            ..Default::default()
        },
        later,
    );

    assert_eq!(job.kind, JobKind::LocalArchive);
    assert_eq!(job.excludes, vec!["*.tmp".to_string()]);
    assert_eq!(job.source, "/mnt/storage/a");
    assert_eq!(job.created_at, Some(created));
    assert_eq!(job.updated_at, Some(later));
    assert!(JobPatch::default().is_empty());
}

#[test]
fn job_kind_parses_wire_names() {
    for kind in JobKind::ALL {
        assert_eq!(kind.as_str().parse::<JobKind>(), Ok(kind));
    }
    assert_eq!("Remote-Sync".parse::<JobKind>(), Ok(JobKind::RemoteSync));
    assert!("ftp".parse::<JobKind>().is_err());
    assert!(JobKind::RemoteMove.is_remote());
    assert!(!JobKind::LocalArchive.is_remote());
}

#[test]
fn history_entry_json_uses_camel_case_and_flattened_target() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap();
    let entry = HistoryEntry::running("e1", target(), start, None);
    let value = serde_json::to_value(&entry).unwrap();

    assert_eq!(value["status"], "running");
    assert_eq!(value["startedAt"], "2024-05-01T03:00:00Z");
    assert_eq!(value["source"], "/mnt/storage/a");
    assert_eq!(value["kind"], "local-mirror");
    assert!(value.get("resumedFrom").is_none());
    assert!(value.get("target").is_none());
}

// tests/cli_args.rs

use clap::Parser;

use nasjobs::cli::{CliArgs, Command};
use nasjobs::types::JobKind;

#[test]
fn create_collects_repeated_excludes() {
    let args = CliArgs::try_parse_from([
        "nasjobs",
        "--config",
        "/etc/Nasjobs.toml",
        "create",
        "--name",
        "photos",
        "--source",
        "/mnt/storage/photos",
        "--destination",
        "b2:bucket/photos",
        "--kind",
        "remote-sync",
        "--cron",
        "0 3 * * *",
        "--exclude",
        "*.tmp",
        "--exclude",
        "cache/**",
        "--keep-last",
        "5",
    ])
    .expect("valid arguments");

    assert_eq!(args.config.as_deref(), Some(std::path::Path::new("/etc/Nasjobs.toml")));
    match args.command {
        Command::Create(create) => {
            assert_eq!(create.kind, JobKind::RemoteSync);
            assert_eq!(create.cron.as_deref(), Some("0 3 * * *"));
            assert_eq!(create.excludes, vec!["*.tmp".to_string(), "cache/**".to_string()]);
            assert_eq!(create.keep_last, Some(5));
        }
        other => panic!("expected create, got {other:?}"),
    }
}

#[test]
fn global_flags_work_after_the_subcommand() {
    let args = CliArgs::try_parse_from(["nasjobs", "status", "abc", "--json", "--log-level", "debug"])
        .expect("valid arguments");
    assert!(args.json);
    assert!(args.log_level.is_some());
    assert!(matches!(args.command, Command::Status { ref id } if id == "abc"));
}

#[test]
fn unknown_kind_and_conflicting_schedule_flags_are_rejected() {
    assert!(
        CliArgs::try_parse_from([
            "nasjobs", "create", "--name", "x", "--source", "/a", "--destination", "/b", "--kind",
            "ftp",
        ])
        .is_err()
    );
    assert!(
        CliArgs::try_parse_from([
            "nasjobs",
            "update",
            "abc",
            "--cron",
            "@daily",
            "--disable-schedule",
        ])
        .is_err()
    );
}

// tests/guards.rs

use chrono::{TimeZone, Timelike, Utc};

use nasjobs::guard::{
    check_exclude, check_remote_spec, crontab_line, is_valid_cron, next_fire, parse_cron,
};

#[test]
fn five_field_cron_and_shorthands_are_accepted() {
    for expr in [
        "0 3 * * *",
        "*/15 * * * *",
        "30 2 1 * *",
        "0 4 * * 1-5",
        " 0 3 * * * ",
        "@daily",
        "@hourly",
        "@weekly",
    ] {
        assert!(is_valid_cron(expr), "{expr:?} should be valid");
    }
}

#[test]
fn malformed_cron_is_rejected_with_reason() {
    for expr in ["", "   ", "every day", "0 3 * *", "0 0 3 * * *", "61 * * * *", "@reboot"] {
        let err = parse_cron(expr).expect_err(expr);
        assert!(!err.is_empty());
    }

    let err = parse_cron("0 0 3 * * *").unwrap_err();
    assert!(err.contains("5 fields"), "{err}");
}

#[test]
fn next_fire_follows_the_expression() {
    let after = Utc.with_ymd_and_hms(2024, 5, 1, 2, 30, 0).unwrap();
    let next = next_fire("0 3 * * *", after).expect("fires");
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap());

    let next = next_fire("*/15 * * * *", after).expect("fires");
    assert_eq!(next.minute(), 45);

    assert!(next_fire("nope", after).is_none());
}

#[test]
fn weekdays_use_crontab_numbering() {
    // 2024-05-01 was a Wednesday.
    let wednesday = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let monday = next_fire("0 3 * * 1", wednesday).expect("fires");
    assert_eq!(monday, Utc.with_ymd_and_hms(2024, 5, 6, 3, 0, 0).unwrap());

    let sunday = Utc.with_ymd_and_hms(2024, 5, 5, 3, 0, 0).unwrap();
    assert_eq!(next_fire("0 3 * * 0", wednesday), Some(sunday));
    assert_eq!(next_fire("0 3 * * 7", wednesday), Some(sunday));

    let friday_late = Utc.with_ymd_and_hms(2024, 5, 3, 10, 0, 0).unwrap();
    assert_eq!(
        next_fire("0 9 * * 1-5", friday_late),
        Some(Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap())
    );
    assert_eq!(
        next_fire("0 9 * * 5-7", friday_late),
        Some(Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap())
    );

    assert!(!is_valid_cron("0 3 * * 8"));
}

#[test]
fn crontab_lines_quote_unsafe_programs() {
    assert_eq!(
        crontab_line("0 3 * * *", "/usr/local/bin/nasjobs", None, "abc-123"),
        "0 3 * * * /usr/local/bin/nasjobs run abc-123"
    );
    assert_eq!(
        crontab_line(
            "@daily",
            "/opt/my tools/nasjobs",
            Some("/etc/nas jobs/Nasjobs.toml"),
            "id"
        ),
        "@daily '/opt/my tools/nasjobs' --config '/etc/nas jobs/Nasjobs.toml' run id"
    );
    assert_eq!(
        crontab_line("@hourly", "it's", None, "id"),
        r"@hourly 'it'\''s' run id"
    );
}

#[test]
fn exclude_patterns() {
    for ok in ["*.tmp", "cache/**", ".DS_Store", "[Tt]humbs.db", "a b; c"] {
        assert!(check_exclude(ok).is_ok(), "{ok:?} should be accepted");
    }

    let too_long = "a".repeat(1025);
    for bad in ["", "  ", "line\nbreak", "tab\there", "unclosed[", too_long.as_str()] {
        assert!(check_exclude(bad).is_err(), "{bad:?} should be rejected");
    }
}

#[test]
fn remote_specs() {
    for ok in ["b2:bucket/path", "gdrive:", "my.remote-1:Photos 2024", "s3_x:a:b"] {
        assert!(check_remote_spec(ok).is_ok(), "{ok:?} should be accepted");
    }
    for bad in ["", "/mnt/storage", "bucket/path", "-rf:x", ":nope", "r:\u{7}", "r:a\nb"] {
        assert!(check_remote_spec(bad).is_err(), "{bad:?} should be rejected");
    }
}

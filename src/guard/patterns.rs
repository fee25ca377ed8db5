// src/guard/patterns.rs

use std::sync::LazyLock;

use globset::Glob;
use regex::Regex;

const MAX_PATTERN_LEN: usize = 1024;

/// `name:path` as understood by rclone. The name may not start with `-`, so
/// a destination can never be mistaken for a flag.
static REMOTE_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*:[^\x00-\x1f\x7f]*$")
        .expect("remote spec regex is valid")
});

/// Check a single exclude pattern.
///
/// Patterns end up as one `--exclude=PATTERN` argument each, so no quoting
/// is involved; this only rejects input no transfer tool would understand.
pub fn check_exclude(pattern: &str) -> Result<(), String> {
    if pattern.trim().is_empty() {
        return Err("exclude pattern is empty".to_string());
    }
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(format!(
            "exclude pattern is longer than {MAX_PATTERN_LEN} bytes"
        ));
    }
    if pattern.chars().any(char::is_control) {
        return Err(format!(
            "exclude pattern {pattern:?} contains control characters"
        ));
    }
    Glob::new(pattern).map_err(|e| format!("invalid exclude pattern {pattern:?}: {e}"))?;
    Ok(())
}

pub fn check_excludes(patterns: &[String]) -> Result<(), String> {
    patterns.iter().try_for_each(|p| check_exclude(p))
}

/// Validate an rclone destination such as `b2:nas-backup/photos`.
pub fn check_remote_spec(spec: &str) -> Result<(), String> {
    if REMOTE_SPEC.is_match(spec) {
        Ok(())
    } else {
        Err(format!(
            "remote destination {spec:?} must look like 'remote:path'"
        ))
    }
}

// src/guard/schedule.rs

//! Cron-expression checks for job schedules.
//!
//! Schedules are materialized into a system crontab by the scheduler, so only
//! the 5-field crontab dialect (and the `@daily`-style shorthands) is
//! accepted. The `cron` crate wants a leading seconds field, so expressions
//! are normalized before parsing.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

const SHORTHANDS: [&str; 6] = [
    "@yearly",
    "@annually",
    "@monthly",
    "@weekly",
    "@daily",
    "@hourly",
];

/// Parse a crontab expression, returning a human-readable reason on failure.
pub fn parse_cron(expr: &str) -> Result<Schedule, String> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err("cron expression is empty".to_string());
    }

    let normalized = if expr.starts_with('@') {
        if !SHORTHANDS.contains(&expr) {
            return Err(format!("unsupported cron shorthand '{expr}'"));
        }
        expr.to_string()
    } else {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "cron expression '{expr}' must have 5 fields (minute hour day month weekday), got {}",
                fields.len()
            ));
        }
        let weekday = crontab_weekday(fields[4])
            .map_err(|e| format!("invalid cron expression '{expr}': {e}"))?;
        format!("0 {} {} {} {} {weekday}", fields[0], fields[1], fields[2], fields[3])
    };

    Schedule::from_str(&normalized).map_err(|e| format!("invalid cron expression '{expr}': {e}"))
}

/// Crontab numbers weekdays 0-7 from Sunday (0 and 7 both Sunday); the
/// `cron` crate numbers them 1-7 from Sunday. Names and `*` pass through.
fn crontab_weekday(field: &str) -> Result<String, String> {
    let mut parts = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, format!("/{step}")),
            None => (part, String::new()),
        };

        let mapped = match range.split_once('-') {
            Some((lo, hi)) => match (weekday_number(lo)?, weekday_number(hi)?) {
                (Some(0), Some(7)) => "1-7".to_string(),
                // `5-7` wraps onto Sunday, which the cron crate cannot express.
                (Some(lo), Some(7)) if step.is_empty() => format!("{}-7,1", lo + 1),
                (Some(lo), Some(7)) => format!("{}-7", lo + 1),
                (Some(lo), Some(hi)) => format!("{}-{}", lo + 1, hi + 1),
                _ => range.to_string(),
            },
            None => match weekday_number(range)? {
                Some(n) => ((n % 7) + 1).to_string(),
                None => range.to_string(),
            },
        };
        parts.push(format!("{mapped}{step}"));
    }
    Ok(parts.join(","))
}

fn weekday_number(token: &str) -> Result<Option<u8>, String> {
    if !token.chars().all(|c| c.is_ascii_digit()) || token.is_empty() {
        return Ok(None);
    }
    match token.parse::<u8>() {
        Ok(n) if n <= 7 => Ok(Some(n)),
        _ => Err(format!("weekday {token} is out of range 0-7")),
    }
}

pub fn is_valid_cron(expr: &str) -> bool {
    parse_cron(expr).is_ok()
}

/// Next time the expression fires strictly after `after`.
pub fn next_fire(expr: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    parse_cron(expr).ok()?.after(&after).next()
}

/// One crontab line that runs `job_id` through `program` when `expr` fires.
///
/// Crontab commands go through `/bin/sh`, so the program and config path are
/// single-quoted. Job ids are generated UUIDs and need no quoting.
pub fn crontab_line(expr: &str, program: &str, config: Option<&str>, job_id: &str) -> String {
    let mut line = format!("{} {}", expr.trim(), shell_quote(program));
    if let Some(config) = config {
        line.push_str(" --config ");
        line.push_str(&shell_quote(config));
    }
    line.push_str(" run ");
    line.push_str(job_id);
    line
}

fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

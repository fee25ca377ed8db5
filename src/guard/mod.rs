// src/guard/mod.rs

//! Input guards applied before anything is persisted or spawned.
//!
//! - [`paths`] confines local locations to the allowed root.
//! - [`schedule`] checks crontab expressions.
//! - [`patterns`] checks exclude globs and rclone remote destinations.

pub mod paths;
pub mod patterns;
pub mod schedule;

pub use paths::PathValidator;
pub use patterns::{check_exclude, check_excludes, check_remote_spec};
pub use schedule::{crontab_line, is_valid_cron, next_fire, parse_cron};

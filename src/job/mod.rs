// src/job/mod.rs

//! Job definitions, their history entries, and the rules applied to them.
//!
//! - [`model`]: the persisted `Job` / `HistoryEntry` records and the
//!   `JobSpec` / `JobPatch` inputs.
//! - [`validate`]: checks every mutation must pass before it is stored.
//! - [`retention`]: trims history to the configured keep-count.

pub mod model;
pub mod retention;
pub mod validate;

pub use model::{HistoryEntry, Job, JobPatch, JobSpec, Retention, Schedule, Target};
pub use retention::{prune, prune_keeping_lineage};
pub use validate::JobValidator;

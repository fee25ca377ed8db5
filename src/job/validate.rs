// src/job/validate.rs

use crate::errors::{NasJobsError, Result};
use crate::guard::{check_excludes, check_remote_spec, parse_cron, PathValidator};

use super::model::{JobSpec, Target};

const MAX_NAME_LEN: usize = 128;
pub const MAX_KEEP_LAST: u32 = 1000;

/// Validation applied to every job mutation before it reaches the document.
#[derive(Debug, Clone)]
pub struct JobValidator {
    paths: PathValidator,
}

impl JobValidator {
    pub fn new(paths: PathValidator) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &PathValidator {
        &self.paths
    }

    pub fn validate_spec(&self, spec: &JobSpec) -> Result<()> {
        validate_name(&spec.name)?;
        self.validate_target(&Target {
            source: spec.source.clone(),
            destination: spec.destination.clone(),
            kind: spec.kind,
        })?;

        if spec.schedule.enabled || !spec.schedule.cron.trim().is_empty() {
            parse_cron(&spec.schedule.cron).map_err(NasJobsError::Validation)?;
        }

        check_excludes(&spec.excludes).map_err(NasJobsError::Validation)?;

        let keep = spec.retention.keep_last;
        if keep == 0 || keep > MAX_KEEP_LAST {
            return Err(NasJobsError::validation(format!(
                "retention.keepLast must be between 1 and {MAX_KEEP_LAST} (got {keep})"
            )));
        }

        Ok(())
    }

    /// [`validate_target`](Self::validate_target) on the blocking pool; the
    /// path checks touch the filesystem.
    pub async fn check_target(&self, target: Target) -> Result<()> {
        let validator = self.clone();
        tokio::task::spawn_blocking(move || validator.validate_target(&target))
            .await
            .map_err(|e| NasJobsError::Other(anyhow::anyhow!("validation task failed: {e}")))?
    }

    /// Check source and destination for the given kind.
    ///
    /// Used both on create/update and by recovery on the snapshot stored in
    /// a history entry, which must not be trusted blindly after a restart.
    pub fn validate_target(&self, target: &Target) -> Result<()> {
        if !self.paths.validate(&target.source) {
            return Err(NasJobsError::validation(format!(
                "source {:?} is not inside {}",
                target.source,
                self.paths.root().display()
            )));
        }

        if target.kind.is_remote() {
            check_remote_spec(&target.destination).map_err(NasJobsError::Validation)?;
        } else if !self.paths.validate(&target.destination) {
            return Err(NasJobsError::validation(format!(
                "destination {:?} is not inside {}",
                target.destination,
                self.paths.root().display()
            )));
        }

        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(NasJobsError::validation("job name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NasJobsError::validation(format!(
            "job name must be at most {MAX_NAME_LEN} bytes"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(NasJobsError::validation(
            "job name must not contain control characters",
        ));
    }
    Ok(())
}

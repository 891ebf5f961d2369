//! Job-scoped logging.

use stemsplit_models::JobId;
use tracing::{error, info, warn};

/// Carries one job's identity into every line the pipeline logs.
///
/// Stages derive their own copy with [`JobLogger::stage`], so a single
/// `job_id` filter pulls a job's whole history out of mixed worker
/// output, labeled `fetch`, `separate`, `upload`, `deliver`.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, stage: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage: stage.into(),
        }
    }

    /// Same job, different stage label.
    pub fn stage(&self, stage: &str) -> Self {
        Self {
            job_id: self.job_id.clone(),
            stage: stage.to_string(),
        }
    }

    pub fn started(&self, detail: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "Started: {}", detail);
    }

    pub fn progress(&self, detail: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "{}", detail);
    }

    pub fn warning(&self, detail: &str) {
        warn!(job_id = %self.job_id, stage = %self.stage, "{}", detail);
    }

    pub fn failed(&self, detail: &str) {
        error!(job_id = %self.job_id, stage = %self.stage, "Failed: {}", detail);
    }

    pub fn completed(&self, detail: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "Completed: {}", detail);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_copies_share_the_job_id() {
        let id = JobId::new();
        let logger = JobLogger::new(&id, "pipeline");
        let upload = logger.stage("upload");

        assert_eq!(upload.job_id(), id.to_string());
        assert_eq!(logger.job_id(), upload.job_id());
    }
}

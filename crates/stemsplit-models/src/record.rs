//! In-flight job record with enforced status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobId;
use crate::stem::StemInfo;

/// Failure summaries are bounded so callback payloads stay small and never
/// leak full stderr dumps.
const MAX_ERROR_SUMMARY_LEN: usize = 512;

/// Lifecycle status of a separation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and waiting in the queue
    #[default]
    Queued,
    /// Worker is fetching the source or running separation
    Running,
    /// Stems are being checksummed and uploaded
    Uploading,
    /// Callback delivery is in progress
    Delivering,
    /// Callback delivered, job done
    Completed,
    /// Job failed; terminal from any non-terminal status
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Uploading => "uploading",
            JobStatus::Delivering => "delivering",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// The only legal forward transition from this status, if any.
    fn successor(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Queued => Some(JobStatus::Running),
            JobStatus::Running => Some(JobStatus::Uploading),
            JobStatus::Uploading => Some(JobStatus::Delivering),
            JobStatus::Delivering => Some(JobStatus::Completed),
            JobStatus::Completed | JobStatus::Failed => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Illegal job status transition: {from} -> {to}")]
pub struct RecordError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Worker-local record of one job's progress.
///
/// Statuses only move forward along
/// Queued -> Running -> Uploading -> Delivering -> Completed, or sideways
/// into Failed from any non-terminal status. Terminal statuses accept no
/// further changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job this record tracks
    pub job_id: JobId,
    /// Current status
    pub status: JobStatus,
    /// When the job was accepted at admission
    pub enqueued_at: DateTime<Utc>,
    /// When a worker first picked the job up
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
    /// Delivery attempt this record belongs to (1-based)
    pub attempt: u32,
    /// Uploaded stems, populated during Uploading
    pub stems: Vec<StemInfo>,
    /// Bounded failure summary, present only when Failed
    pub error: Option<String>,
}

impl JobRecord {
    /// Create a fresh record in Queued.
    pub fn new(job_id: JobId, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            enqueued_at,
            started_at: None,
            finished_at: None,
            attempt: 0,
            stems: Vec::new(),
            error: None,
        }
    }

    /// Advance to the next status along the forward path.
    pub fn advance(&mut self, next: JobStatus) -> Result<(), RecordError> {
        if self.status.successor() != Some(next) {
            return Err(RecordError {
                from: self.status,
                to: next,
            });
        }
        match next {
            JobStatus::Running => {
                self.started_at = Some(Utc::now());
                self.attempt += 1;
            }
            JobStatus::Completed => {
                self.finished_at = Some(Utc::now());
            }
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    /// Fail the job. Legal from any non-terminal status.
    pub fn fail(&mut self, summary: impl Into<String>) -> Result<(), RecordError> {
        if self.status.is_terminal() {
            return Err(RecordError {
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        let mut summary = summary.into();
        summary.truncate(MAX_ERROR_SUMMARY_LEN);
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(summary);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock processing time, from pickup to finish (or now).
    pub fn processing_time_ms(&self) -> u64 {
        let Some(started) = self.started_at else {
            return 0;
        };
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - started).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(JobId::new(), Utc::now())
    }

    #[test]
    fn forward_path_is_legal() {
        let mut r = record();
        r.advance(JobStatus::Running).unwrap();
        r.advance(JobStatus::Uploading).unwrap();
        r.advance(JobStatus::Delivering).unwrap();
        r.advance(JobStatus::Completed).unwrap();
        assert!(r.is_terminal());
        assert!(r.started_at.is_some());
        assert!(r.finished_at.is_some());
    }

    #[test]
    fn skipping_a_status_is_rejected() {
        let mut r = record();
        let err = r.advance(JobStatus::Uploading).unwrap_err();
        assert_eq!(err.from, JobStatus::Queued);
        assert_eq!(err.to, JobStatus::Uploading);
        assert_eq!(r.status, JobStatus::Queued);
    }

    #[test]
    fn moving_backward_is_rejected() {
        let mut r = record();
        r.advance(JobStatus::Running).unwrap();
        r.advance(JobStatus::Uploading).unwrap();
        assert!(r.advance(JobStatus::Running).is_err());
    }

    #[test]
    fn fail_is_legal_from_every_non_terminal_status() {
        for steps in 0..4 {
            let mut r = record();
            let path = [
                JobStatus::Running,
                JobStatus::Uploading,
                JobStatus::Delivering,
            ];
            for next in path.iter().take(steps) {
                r.advance(*next).unwrap();
            }
            r.fail("boom").unwrap();
            assert_eq!(r.status, JobStatus::Failed);
            assert_eq!(r.error.as_deref(), Some("boom"));
            assert!(r.finished_at.is_some());
        }
    }

    #[test]
    fn terminal_statuses_accept_no_transitions() {
        let mut completed = record();
        completed.advance(JobStatus::Running).unwrap();
        completed.advance(JobStatus::Uploading).unwrap();
        completed.advance(JobStatus::Delivering).unwrap();
        completed.advance(JobStatus::Completed).unwrap();
        assert!(completed.advance(JobStatus::Running).is_err());
        assert!(completed.fail("late").is_err());

        let mut failed = record();
        failed.fail("early").unwrap();
        assert!(failed.advance(JobStatus::Running).is_err());
        assert!(failed.fail("again").is_err());
    }

    #[test]
    fn failure_summary_is_bounded() {
        let mut r = record();
        r.fail("x".repeat(10_000)).unwrap();
        assert_eq!(r.error.as_ref().unwrap().len(), MAX_ERROR_SUMMARY_LEN);
    }

    #[test]
    fn processing_time_counts_from_pickup() {
        let mut r = record();
        assert_eq!(r.processing_time_ms(), 0);
        r.advance(JobStatus::Running).unwrap();
        r.fail("boom").unwrap();
        // started and finished within this test, so the delta is tiny
        assert!(r.processing_time_ms() < 5_000);
    }
}

//! Worker process settings.

use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Knobs for the executor and job pipeline, read once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How many jobs may run at once on this GPU
    pub max_concurrent_jobs: usize,
    /// Wall-clock cap for a single job, download through callback
    pub job_timeout: Duration,
    /// How long `run` waits for in-flight jobs after ctrl-c
    pub shutdown_timeout: Duration,
    /// Scratch root; each job gets a subdirectory here
    pub work_dir: String,
    /// Cadence of the pending-entries claim scan
    pub claim_interval: Duration,
    /// Idle floor before another worker's pending message may be stolen
    pub claim_min_idle: Duration,
    /// Maximum size of a fetched input file in bytes
    pub max_input_bytes: u64,
    /// Maximum combined size of separated stems in bytes
    pub max_output_bytes: u64,
    /// Per-request timeout for webhook deliveries
    pub webhook_timeout: Duration,
    /// Port for the Prometheus scrape endpoint
    pub metrics_port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            job_timeout: Duration::from_secs(1800), // 30 minutes
            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/stemsplit".to_string(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(2100), // 35 minutes
            max_input_bytes: 1024 * 1024 * 1024,       // 1 GiB
            max_output_bytes: 8 * 1024 * 1024 * 1024,  // 8 GiB
            webhook_timeout: Duration::from_secs(30),
            metrics_port: 9090,
        }
    }
}

impl WorkerConfig {
    /// Pull settings from the environment, falling back to the defaults.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: parsed_env("WORKER_MAX_JOBS").unwrap_or(1),
            job_timeout: Duration::from_secs(
                parsed_env("WORKER_JOB_TIMEOUT_SECS").unwrap_or(1800),
            ),
            shutdown_timeout: Duration::from_secs(
                parsed_env("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(30),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .unwrap_or_else(|_| "/tmp/stemsplit".to_string()),
            claim_interval: Duration::from_secs(
                parsed_env("WORKER_CLAIM_INTERVAL_SECS").unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                parsed_env("WORKER_CLAIM_MIN_IDLE_SECS").unwrap_or(2100),
            ),
            max_input_bytes: parsed_env("WORKER_MAX_INPUT_BYTES").unwrap_or(1024 * 1024 * 1024),
            max_output_bytes: parsed_env("WORKER_MAX_OUTPUT_BYTES")
                .unwrap_or(8 * 1024 * 1024 * 1024),
            webhook_timeout: Duration::from_secs(parsed_env("WEBHOOK_TIMEOUT_SECS").unwrap_or(30)),
            metrics_port: parsed_env("WORKER_METRICS_PORT").unwrap_or(9090),
        }
    }

    /// Validate cross-field constraints.
    ///
    /// A pending entry must not become claimable while its owner may
    /// still legitimately be working on it, so the claim idle threshold
    /// has to exceed the job wall-clock cap.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.claim_min_idle <= self.job_timeout {
            return Err(WorkerError::config_error(format!(
                "WORKER_CLAIM_MIN_IDLE_SECS ({}s) must be greater than WORKER_JOB_TIMEOUT_SECS ({}s)",
                self.claim_min_idle.as_secs(),
                self.job_timeout.as_secs()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(WorkerConfig::default().validate().is_ok());
    }

    #[test]
    fn claim_idle_below_job_timeout_is_rejected() {
        let config = WorkerConfig {
            job_timeout: Duration::from_secs(600),
            claim_min_idle: Duration::from_secs(300),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("WORKER_CLAIM_MIN_IDLE_SECS"));
    }
}

//! Prometheus metrics.
//!
//! The worker has no HTTP router to hang a `/metrics` route on, so the
//! exporter serves scrapes from its own listener.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const JOBS_COMPLETED: &str = "stemsplit_jobs_completed_total";
pub const JOBS_FAILED: &str = "stemsplit_jobs_failed_total";
pub const JOBS_DEAD_LETTERED: &str = "stemsplit_jobs_dead_lettered_total";
pub const SEPARATION_SECONDS: &str = "stemsplit_separation_duration_seconds";
pub const WEBHOOK_ATTEMPTS: &str = "stemsplit_webhook_attempts_total";
pub const WEBHOOK_DELIVERIES: &str = "stemsplit_webhook_deliveries_total";

/// Install the recorder with a scrape listener on `port`.
pub fn init_metrics(port: u16) {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .expect("Prometheus recorder install failed");
}

/// Count one finished job, labeled by separation model.
pub fn record_job_completed(model: &str) {
    counter!(JOBS_COMPLETED, "model" => model.to_string()).increment(1);
}

/// Count one terminal failure, labeled by error kind.
pub fn record_job_failed(kind: &str) {
    counter!(JOBS_FAILED, "kind" => kind.to_string()).increment(1);
}

/// Count one job handed to the dead letter stream.
pub fn record_job_dead_lettered() {
    counter!(JOBS_DEAD_LETTERED).increment(1);
}

/// Time spent inside the separator for one job.
pub fn record_separation_duration(model: &str, duration_secs: f64) {
    histogram!(SEPARATION_SECONDS, "model" => model.to_string()).record(duration_secs);
}

/// Add the attempts one callback burned through.
pub fn record_webhook_attempts(attempts: u32) {
    counter!(WEBHOOK_ATTEMPTS).increment(attempts as u64);
}

/// Count a callback's final outcome (delivered, rejected, exhausted).
pub fn record_webhook_delivery(outcome: &str) {
    counter!(WEBHOOK_DELIVERIES, "outcome" => outcome.to_string()).increment(1);
}

//! Prometheus metrics.
//!
//! The recorder installs process-wide; the handle it returns renders the
//! scrape text served at `/metrics`.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const HTTP_REQUESTS: &str = "stemsplit_http_requests_total";
pub const HTTP_LATENCY: &str = "stemsplit_http_request_duration_seconds";
pub const HTTP_IN_FLIGHT: &str = "stemsplit_http_requests_in_flight";
pub const QUEUE_DEPTH: &str = "stemsplit_queue_depth";
pub const JOBS_ENQUEUED: &str = "stemsplit_jobs_enqueued_total";

/// Install the process-wide Prometheus recorder.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Prometheus recorder install failed")
}

/// Count one admitted job, labeled by separation model.
pub fn record_job_enqueued(model: &str) {
    counter!(JOBS_ENQUEUED, "model" => model.to_string()).increment(1);
}

/// Publish the current stream depth.
pub fn set_queue_depth(depth: u64) {
    gauge!(QUEUE_DEPTH).set(depth as f64);
}

/// Counts and times every request passing through the router.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    gauge!(HTTP_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(HTTP_IN_FLIGHT).decrement(1.0);

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!(HTTP_REQUESTS, &labels).increment(1);
    histogram!(HTTP_LATENCY, &labels).record(started.elapsed().as_secs_f64());

    response
}

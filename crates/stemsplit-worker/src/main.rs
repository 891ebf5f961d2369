//! Stem separation worker binary.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stemsplit_queue::JobQueue;
use stemsplit_worker::{metrics, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // rustls 0.23 wants a process-wide provider before any TLS client exists
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("rustls provider install failed");

    init_tracing();
    info!("Starting stemsplit-worker");

    let config = WorkerConfig::from_env();
    if let Err(e) = config.validate() {
        error!("Invalid worker configuration: {}", e);
        std::process::exit(1);
    }
    info!("Worker settings: {:?}", config);

    // No router in this process, so the exporter brings its own listener
    let metrics_on = std::env::var("METRICS_ENABLED")
        .map(|v| v.to_lowercase() != "false")
        .unwrap_or(true);
    if metrics_on {
        metrics::init_metrics(config.metrics_port);
        info!("Metrics endpoint listening on port {}", config.metrics_port);
    }

    let queue = JobQueue::from_env().unwrap_or_else(|e| {
        error!("Queue client init failed: {}", e);
        std::process::exit(1);
    });

    let executor = JobExecutor::new(config, queue);
    if let Err(e) = executor.run().await {
        error!("Executor stopped with error: {}", e);
        std::process::exit(1);
    }

    info!("Worker stopped");
}

/// Same switch as the API binary: JSON lines under `LOG_FORMAT=json`,
/// colored text otherwise, `stemsplit=info` unless `RUST_LOG` says more.
fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive("stemsplit=info".parse().unwrap());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(filter)
            .init();
    }
}

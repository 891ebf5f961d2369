//! Admission server binary.

use std::net::SocketAddr;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stemsplit_api::{build_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // rustls 0.23 wants a process-wide provider before any TLS client exists
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("rustls provider install failed");

    init_tracing();
    info!("Starting stemsplit-api");

    let config = ApiConfig::from_env();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    info!(
        "Admission config: {}:{}, signature skew {}s",
        config.host,
        config.port,
        config.signature_max_skew.as_secs()
    );
    if config.webhook_allowlist.is_empty() {
        warn!("WEBHOOK_ALLOWLIST is empty; all split requests will be rejected");
    }

    let state = AppState::new(config.clone()).unwrap_or_else(|e| {
        error!("State init failed: {}", e);
        std::process::exit(1);
    });

    // Scrape surface is on unless explicitly switched off
    let metrics_handle = match std::env::var("METRICS_ENABLED").as_deref() {
        Ok("false") | Ok("0") => None,
        _ => {
            info!("Prometheus metrics enabled at /metrics");
            Some(metrics::init_metrics())
        }
    };

    let app = build_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("bad bind address");
    info!("Admission API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    info!("Admission API stopped");
}

/// JSON lines when `LOG_FORMAT=json`, colored text otherwise. `RUST_LOG`
/// still wins over the baked-in `stemsplit=info` default.
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

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("ctrl-c handler install failed");
    info!("Shutdown signal received");
}

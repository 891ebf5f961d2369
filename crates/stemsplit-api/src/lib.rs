//! Admission API for the stem-separation service.
//!
//! Verifies HMAC-signed submissions, enforces the webhook allowlist, and
//! hands accepted jobs to the Redis stream the workers drain. The binary
//! lives in `main.rs`; everything here is also reachable from the
//! integration tests.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use routes::build_router;
pub use state::AppState;

//! Admission server settings.

use std::time::Duration;

fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Settings for the admission process, all sourced from the environment.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret for inbound request and outbound callback signing
    pub webhook_signing_secret: String,
    /// How far an `X-Timestamp` may drift from now, in either direction
    pub signature_max_skew: Duration,
    /// Allowed webhook destinations; empty rejects every submission
    pub webhook_allowlist: Vec<String>,
    /// Cap on request body bytes, enforced by the body-limit layer
    pub max_body_size: usize,
    /// Deployment environment; gates error detail in responses
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            webhook_signing_secret: String::new(),
            signature_max_skew: Duration::from_secs(300),
            webhook_allowlist: Vec::new(),
            max_body_size: 1024 * 1024, // 1MB
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Read settings from the environment, with defaults for local runs.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed_env("API_PORT").unwrap_or(8080),
            webhook_signing_secret: std::env::var("WEBHOOK_SIGNING_SECRET").unwrap_or_default(),
            signature_max_skew: Duration::from_secs(
                parsed_env("SIGNATURE_MAX_SKEW_SECS").unwrap_or(300),
            ),
            webhook_allowlist: std::env::var("WEBHOOK_ALLOWLIST")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            max_body_size: parsed_env("MAX_BODY_SIZE").unwrap_or(1024 * 1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Reject configurations the service cannot run safely with.
    pub fn validate(&self) -> Result<(), String> {
        if self.webhook_signing_secret.is_empty() {
            return Err("WEBHOOK_SIGNING_SECRET must be set".to_string());
        }
        Ok(())
    }

    /// True under `ENVIRONMENT=production`.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

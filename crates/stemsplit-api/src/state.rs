//! Shared handler state.

use std::sync::Arc;

use tracing::warn;

use stemsplit_queue::JobQueue;
use stemsplit_webhook::{SignatureCodec, WebhookAllowlist};

use crate::config::ApiConfig;

/// Everything a handler needs, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: Arc<JobQueue>,
    pub codec: Arc<SignatureCodec>,
    pub allowlist: Arc<WebhookAllowlist>,
}

impl AppState {
    /// Connect the broker and derive the signing codec and allowlist from
    /// `config`.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let queue = Arc::new(JobQueue::from_env()?);
        let codec = Arc::new(SignatureCodec::new(config.webhook_signing_secret.clone()));
        let allowlist = Arc::new(WebhookAllowlist::new(config.webhook_allowlist.clone()));

        if allowlist.is_empty() {
            warn!("Webhook allowlist is empty; every submission will be rejected");
        }

        Ok(Self {
            config,
            queue,
            codec,
            allowlist,
        })
    }
}

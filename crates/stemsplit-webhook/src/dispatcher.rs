//! Callback delivery with bounded, classified retries.

use std::time::Duration;

use chrono::Utc;
use reqwest::{header::CONTENT_TYPE, StatusCode};
use tracing::{debug, info, warn};

use stemsplit_models::WebhookPayload;

use crate::backoff::BackoffPolicy;
use crate::error::{WebhookError, WebhookResult};
use crate::signature::SignatureCodec;

/// Header carrying `sha256=<hex>`.
pub const SIGNATURE_HEADER: &str = "X-Signature";
/// Header carrying the unix-seconds timestamp the signature covers.
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";

/// Final result of one delivery sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint accepted the callback.
    Delivered { attempts: u32 },
    /// The endpoint rejected the callback with a non-retryable status.
    Rejected { status: u16, attempts: u32 },
    /// Every allowed attempt failed transiently.
    Exhausted { attempts: u32, last_error: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Sends signed callback POSTs.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    codec: SignatureCodec,
    policy: BackoffPolicy,
}

impl WebhookDispatcher {
    /// Build a dispatcher with a per-request timeout.
    pub fn new(
        codec: SignatureCodec,
        policy: BackoffPolicy,
        request_timeout: Duration,
    ) -> WebhookResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            codec,
            policy,
        })
    }

    /// Deliver one payload to one URL.
    ///
    /// 2xx ends the sequence as Delivered. 408, 429, 5xx and transport
    /// errors are transient and retried on the backoff schedule; any other
    /// 4xx is Rejected without another attempt. At most one successful
    /// callback ever leaves this method.
    pub async fn deliver(&self, url: &str, payload: &WebhookPayload) -> WebhookResult<DeliveryOutcome> {
        let body = serde_json::to_vec(payload)?;
        let mut attempts: u32 = 0;
        let mut last_error = String::new();

        loop {
            if attempts > 0 {
                let delay = self.policy.delay_for_attempt(attempts);
                debug!(
                    "Retrying webhook delivery to {} in {:?} (attempt {})",
                    url,
                    delay,
                    attempts + 1
                );
                tokio::time::sleep(delay).await;
            }
            attempts += 1;

            match self.post_once(url, &body).await {
                Ok(status) if status.is_success() => {
                    info!("Webhook delivered to {} after {} attempt(s)", url, attempts);
                    return Ok(DeliveryOutcome::Delivered { attempts });
                }
                Ok(status) if is_transient_status(status) => {
                    warn!(
                        "Webhook attempt {} to {} got transient HTTP {}",
                        attempts, url, status
                    );
                    last_error = format!("HTTP {}", status.as_u16());
                }
                Ok(status) => {
                    warn!("Webhook to {} rejected with HTTP {}, not retrying", url, status);
                    return Ok(DeliveryOutcome::Rejected {
                        status: status.as_u16(),
                        attempts,
                    });
                }
                Err(WebhookError::Http(e)) => {
                    warn!("Webhook attempt {} to {} failed: {}", attempts, url, e);
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }

            if !self.policy.should_retry(attempts) {
                warn!(
                    "Webhook delivery to {} exhausted after {} attempt(s): {}",
                    url, attempts, last_error
                );
                return Ok(DeliveryOutcome::Exhausted {
                    attempts,
                    last_error,
                });
            }
        }
    }

    /// One signed POST. The timestamp is fresh per attempt so retries are
    /// never rejected for skew.
    async fn post_once(&self, url: &str, body: &[u8]) -> WebhookResult<StatusCode> {
        let timestamp = Utc::now().timestamp();
        let signature = self.codec.sign(body, timestamp)?;

        let response = self
            .client
            .post(url)
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await?;

        Ok(response.status())
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn throttling_and_timeouts_are_transient() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
    }

    #[test]
    fn other_client_errors_are_permanent() {
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::GONE));
    }
}

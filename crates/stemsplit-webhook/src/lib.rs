//! Signed webhook callbacks.
//!
//! The HMAC-SHA256 codec here signs outbound callbacks and verifies
//! inbound submissions; the allowlist gates where callbacks may go. On
//! top of those sit the jittered backoff policy and the dispatcher that
//! retries transient delivery failures and gives up on permanent ones.

pub mod allowlist;
pub mod backoff;
pub mod dispatcher;
pub mod error;
pub mod signature;

pub use allowlist::WebhookAllowlist;
pub use backoff::BackoffPolicy;
pub use dispatcher::{DeliveryOutcome, WebhookDispatcher, SIGNATURE_HEADER, TIMESTAMP_HEADER};
pub use error::{WebhookError, WebhookResult};
pub use signature::{SignatureCodec, SIGNATURE_PREFIX};

//! Shared data models for the StemSplit backend.
//!
//! Job identifiers and the in-flight job record, the separation model and
//! stem enums, the admission request/response schemas, and the webhook
//! callback payloads. Everything here serializes with serde; the wire
//! types use the camelCase field names the admission contract fixes.

pub mod callback;
pub mod job;
pub mod model;
pub mod record;
pub mod request;
pub mod stem;

// Re-export common types
pub use callback::{CallbackStatus, WebhookPayload};
pub use job::JobId;
pub use model::{ModelParseError, ModelVariant};
pub use record::{JobRecord, JobStatus, RecordError};
pub use request::{QueueStatusResponse, SplitRequest, SplitResponse};
pub use stem::{StemInfo, StemParseError, StemType};

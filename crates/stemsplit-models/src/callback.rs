//! Webhook callback payloads.

use serde::{Deserialize, Serialize};

use crate::stem::StemInfo;

/// Final outcome reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Completed,
    Failed,
}

impl CallbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackStatus::Completed => "completed",
            CallbackStatus::Failed => "failed",
        }
    }
}

/// Body of the signed callback POST.
///
/// Exactly one of these is delivered per job: either a completed payload
/// with the uploaded stems, or a failed payload with empty stems and a
/// bounded error summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Echo of the admission request's versionId
    pub version_id: String,
    pub status: CallbackStatus,
    /// Wall-clock time from pickup to terminal status
    pub processing_time_ms: u64,
    /// Uploaded artifacts; empty on failure
    pub stems: Vec<StemInfo>,
    /// Failure summary; null on success
    pub error: Option<String>,
}

impl WebhookPayload {
    pub fn completed(version_id: impl Into<String>, processing_time_ms: u64, stems: Vec<StemInfo>) -> Self {
        Self {
            version_id: version_id.into(),
            status: CallbackStatus::Completed,
            processing_time_ms,
            stems,
            error: None,
        }
    }

    pub fn failed(version_id: impl Into<String>, processing_time_ms: u64, error: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            status: CallbackStatus::Failed,
            processing_time_ms,
            stems: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stem::StemType;

    #[test]
    fn completed_payload_shape() {
        let payload = WebhookPayload::completed(
            "v-1",
            123_456,
            vec![StemInfo {
                stem_type: StemType::Drums,
                name: "Drums".to_string(),
                url: "https://cdn.example/v-1/drums.wav".to_string(),
                size: 42,
                duration: 180.0,
                checksum: "sha256:00".to_string(),
            }],
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["versionId"], "v-1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["processingTimeMs"], 123_456);
        assert_eq!(json["stems"][0]["type"], "drums");
        assert_eq!(json["error"], serde_json::Value::Null);
    }

    #[test]
    fn failed_payload_has_empty_stems_and_error() {
        let payload = WebhookPayload::failed("v-1", 99, "ProcessingError: exit status 1");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stems"].as_array().unwrap().len(), 0);
        assert_eq!(json["error"], "ProcessingError: exit status 1");
    }
}

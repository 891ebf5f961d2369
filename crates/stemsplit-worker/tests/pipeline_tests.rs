//! End-to-end pipeline tests with a stub separator and in-memory storage.
//!
//! Source audio and the callback endpoint are served by mock HTTP servers;
//! only demucs and S3 are substituted.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stemsplit_media::{MediaError, MediaResult, SeparatedStem, Separator};
use stemsplit_models::{JobStatus, ModelVariant, WebhookPayload};
use stemsplit_queue::SplitJob;
use stemsplit_storage::{ObjectStore, StorageResult};
use stemsplit_webhook::{
    BackoffPolicy, DeliveryOutcome, SignatureCodec, WebhookDispatcher, SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};
use stemsplit_worker::{process_split, ProcessingContext, WorkerConfig, WorkerError};

const SECRET: &str = "test-secret";

/// Separator that fabricates stem files instead of running demucs.
struct StubSeparator;

#[async_trait]
impl Separator for StubSeparator {
    async fn separate(
        &self,
        _input: &Path,
        out_dir: &Path,
        model: ModelVariant,
    ) -> MediaResult<Vec<SeparatedStem>> {
        let mut stems = Vec::new();
        for stem_type in model.expected_stems() {
            let path = out_dir.join(format!("{}.wav", stem_type.as_str()));
            tokio::fs::write(&path, format!("{} audio bytes", stem_type.as_str())).await?;
            stems.push(SeparatedStem {
                stem_type: *stem_type,
                path,
            });
        }
        Ok(stems)
    }
}

/// Separator that never finishes inside any sane deadline.
struct SlowSeparator;

#[async_trait]
impl Separator for SlowSeparator {
    async fn separate(
        &self,
        _input: &Path,
        _out_dir: &Path,
        _model: ModelVariant,
    ) -> MediaResult<Vec<SeparatedStem>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Separator that fails like a crashed demucs run.
struct FailingSeparator;

#[async_trait]
impl Separator for FailingSeparator {
    async fn separate(
        &self,
        _input: &Path,
        _out_dir: &Path,
        _model: ModelVariant,
    ) -> MediaResult<Vec<SeparatedStem>> {
        Err(MediaError::SeparationFailed {
            message: "demucs exited with status 1".into(),
            stderr: Some("CUDA out of memory".into()),
            exit_code: Some(1),
        })
    }
}

/// In-memory object store recording uploaded keys.
#[derive(Default)]
struct MemoryStore {
    keys: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload_file(&self, _path: &Path, key: &str, _content_type: &str) -> StorageResult<()> {
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.keys.lock().unwrap().iter().any(|k| k == key))
    }

    async fn presign_get(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        Ok(format!("https://cdn.test/{}?signed", key))
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://cdn.test/{}", key)
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

struct Harness {
    ctx: ProcessingContext,
    audio_server: MockServer,
    hook_server: MockServer,
    store: Arc<MemoryStore>,
    work_dir: tempfile::TempDir,
}

impl Harness {
    fn job(&self) -> SplitJob {
        SplitJob::new(
            "v-42",
            format!("{}/track.wav", self.audio_server.uri()),
            ModelVariant::Htdemucs,
            format!("{}/webhooks/stems", self.hook_server.uri()),
        )
    }
}

async fn harness(
    separator: Arc<dyn Separator>,
    tweak: impl FnOnce(&mut WorkerConfig),
) -> Harness {
    let audio_server = MockServer::start().await;
    let hook_server = MockServer::start().await;
    let work_dir = tempfile::tempdir().unwrap();

    let mut config = WorkerConfig {
        work_dir: work_dir.path().to_string_lossy().into_owned(),
        job_timeout: Duration::from_secs(30),
        webhook_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    tweak(&mut config);

    let store = Arc::new(MemoryStore::default());
    let storage: Arc<dyn ObjectStore> = store.clone();

    let policy = BackoffPolicy::default()
        .with_max_attempts(2)
        .with_base_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(20))
        .with_jitter(0.0);
    let dispatcher =
        WebhookDispatcher::new(SignatureCodec::new(SECRET), policy, Duration::from_secs(5))
            .expect("Failed to build dispatcher");

    let ctx = ProcessingContext {
        config,
        storage,
        separator,
        dispatcher,
        http: reqwest::Client::new(),
    };

    Harness {
        ctx,
        audio_server,
        hook_server,
        store,
        work_dir,
    }
}

async fn serve_audio(server: &MockServer, body_len: usize) {
    Mock::given(method("GET"))
        .and(path("/track.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; body_len]))
        .mount(server)
        .await;
}

fn header_value(request: &wiremock::Request, name: &str) -> Option<String> {
    request
        .headers
        .iter()
        .find(|(k, _)| k.to_string().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.last().to_string())
}

#[tokio::test]
async fn completed_job_delivers_signed_callback() {
    let h = harness(Arc::new(StubSeparator), |_| {}).await;
    serve_audio(&h.audio_server, 1024).await;
    Mock::given(method("POST"))
        .and(path("/webhooks/stems"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.hook_server)
        .await;

    let job = h.job();
    let record = process_split(&h.ctx, &job).await.expect("Pipeline failed");

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.stems.len(), 4);
    assert!(record.finished_at.is_some());

    // Every stem went up under the version prefix
    let keys = h.store.keys.lock().unwrap().clone();
    assert_eq!(keys.len(), 4);
    assert!(keys.iter().all(|k| k.starts_with("v-42/")));

    // The callback body verifies against the shared secret
    let requests = h.hook_server.received_requests().await.unwrap();
    let request = &requests[0];
    let signature = header_value(request, SIGNATURE_HEADER).expect("Missing signature header");
    let timestamp = header_value(request, TIMESTAMP_HEADER).expect("Missing timestamp header");
    assert!(SignatureCodec::new(SECRET).verify(
        &request.body,
        &timestamp,
        &signature,
        Duration::from_secs(300)
    ));

    // Wire shape is camelCase with per-stem metadata
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["versionId"], "v-42");
    assert_eq!(body["status"], "completed");
    assert!(body["processingTimeMs"].is_u64());
    assert!(body["error"].is_null());

    let stems = body["stems"].as_array().unwrap();
    assert_eq!(stems.len(), 4);
    for stem in stems {
        assert!(stem["checksum"].as_str().unwrap().starts_with("sha256:"));
        assert!(stem["url"].as_str().unwrap().contains("v-42/"));
        assert!(stem["size"].as_u64().unwrap() > 0);
        assert!(stem["duration"].is_number());
    }
}

#[tokio::test]
async fn separation_failure_is_terminal_processing_error() {
    let h = harness(Arc::new(FailingSeparator), |_| {}).await;
    serve_audio(&h.audio_server, 512).await;

    let failure = process_split(&h.ctx, &h.job())
        .await
        .expect_err("Pipeline should fail");

    assert_eq!(failure.record.status, JobStatus::Failed);
    assert_eq!(failure.error.kind(), "ProcessingError");
    assert!(!failure.error.is_retryable());

    let summary = failure.record.error.expect("Record should carry a summary");
    assert!(summary.starts_with("ProcessingError:"), "summary: {}", summary);
    assert!(summary.contains("demucs"));
}

#[tokio::test]
async fn deadline_overrun_is_a_resource_limit() {
    let h = harness(Arc::new(SlowSeparator), |c| {
        c.job_timeout = Duration::from_millis(300);
    })
    .await;
    serve_audio(&h.audio_server, 512).await;

    let failure = process_split(&h.ctx, &h.job())
        .await
        .expect_err("Pipeline should time out");

    assert_eq!(failure.error.kind(), "ResourceLimitExceeded");
    assert!(!failure.error.is_retryable());
    assert_eq!(failure.record.status, JobStatus::Failed);
}

#[tokio::test]
async fn oversized_input_is_a_resource_limit() {
    let h = harness(Arc::new(StubSeparator), |c| {
        c.max_input_bytes = 100;
    })
    .await;
    serve_audio(&h.audio_server, 4096).await;

    let failure = process_split(&h.ctx, &h.job())
        .await
        .expect_err("Oversized input should fail");

    assert_eq!(failure.error.kind(), "ResourceLimitExceeded");
    assert!(!failure.error.is_retryable());
}

#[tokio::test]
async fn scratch_space_is_removed_after_success_and_failure() {
    let ok = harness(Arc::new(StubSeparator), |_| {}).await;
    serve_audio(&ok.audio_server, 1024).await;
    Mock::given(method("POST"))
        .and(path("/webhooks/stems"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&ok.hook_server)
        .await;
    process_split(&ok.ctx, &ok.job()).await.expect("Pipeline failed");
    assert!(
        std::fs::read_dir(ok.work_dir.path()).unwrap().next().is_none(),
        "work dir should be empty after success"
    );

    let bad = harness(Arc::new(FailingSeparator), |_| {}).await;
    serve_audio(&bad.audio_server, 1024).await;
    process_split(&bad.ctx, &bad.job())
        .await
        .expect_err("Pipeline should fail");
    assert!(
        std::fs::read_dir(bad.work_dir.path()).unwrap().next().is_none(),
        "work dir should be empty after failure"
    );
}

#[tokio::test]
async fn failure_callback_is_signed_with_empty_stems() {
    let h = harness(Arc::new(FailingSeparator), |_| {}).await;
    serve_audio(&h.audio_server, 512).await;
    Mock::given(method("POST"))
        .and(path("/webhooks/stems"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.hook_server)
        .await;

    let job = h.job();
    let failure = process_split(&h.ctx, &job)
        .await
        .expect_err("Pipeline should fail");

    // What the executor sends when retries are exhausted
    let summary = format!("{}: {}", failure.error.kind(), failure.error);
    let payload = WebhookPayload::failed(
        &job.version_id,
        failure.record.processing_time_ms(),
        &summary,
    );
    let outcome = h
        .ctx
        .dispatcher
        .deliver(&job.webhook_url, &payload)
        .await
        .expect("Delivery should not error");
    assert!(matches!(outcome, DeliveryOutcome::Delivered { attempts: 1 }));

    let requests = h.hook_server.received_requests().await.unwrap();
    let request = &requests[0];
    let signature = header_value(request, SIGNATURE_HEADER).expect("Missing signature header");
    let timestamp = header_value(request, TIMESTAMP_HEADER).expect("Missing timestamp header");
    assert!(SignatureCodec::new(SECRET).verify(
        &request.body,
        &timestamp,
        &signature,
        Duration::from_secs(300)
    ));

    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["versionId"], "v-42");
    assert_eq!(body["status"], "failed");
    assert_eq!(body["stems"].as_array().unwrap().len(), 0);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("ProcessingError:"), "error: {}", error);
}

#[tokio::test]
async fn rejected_callback_fails_without_retry() {
    let h = harness(Arc::new(StubSeparator), |_| {}).await;
    serve_audio(&h.audio_server, 1024).await;
    Mock::given(method("POST"))
        .and(path("/webhooks/stems"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&h.hook_server)
        .await;

    let failure = process_split(&h.ctx, &h.job())
        .await
        .expect_err("Rejected callback should fail the job");

    assert_eq!(failure.error.kind(), "ProcessingError");
    assert!(!failure.error.is_retryable());
    match &failure.error {
        WorkerError::DeliveryRejected(status) => assert_eq!(*status, 400),
        other => panic!("Expected DeliveryRejected, got {:?}", other),
    }
    assert_eq!(h.hook_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_callback_is_a_retryable_infra_failure() {
    let h = harness(Arc::new(StubSeparator), |_| {}).await;
    serve_audio(&h.audio_server, 1024).await;
    Mock::given(method("POST"))
        .and(path("/webhooks/stems"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.hook_server)
        .await;

    let failure = process_split(&h.ctx, &h.job())
        .await
        .expect_err("Exhausted delivery should fail the job");

    assert_eq!(failure.error.kind(), "TransientInfraError");
    assert!(failure.error.is_retryable());
    match &failure.error {
        WorkerError::DeliveryFailed { attempts, .. } => assert_eq!(*attempts, 2),
        other => panic!("Expected DeliveryFailed, got {:?}", other),
    }
    // Attempt budget from the backoff policy was honored
    assert_eq!(h.hook_server.received_requests().await.unwrap().len(), 2);
}

//! Stem separation pipeline orchestration.
//!
//! One job runs fetch -> separate -> checksum/upload -> callback inside a
//! single wall-clock deadline, with scratch space that is removed no
//! matter how the job ends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use stemsplit_media::{
    download_audio, probe_audio, sha256_file, DemucsSeparator, SeparatedStem, Separator,
};
use stemsplit_models::{JobRecord, JobStatus, StemInfo, WebhookPayload};
use stemsplit_queue::SplitJob;
use stemsplit_storage::{ObjectStore, S3Store};
use stemsplit_webhook::{BackoffPolicy, DeliveryOutcome, SignatureCodec, WebhookDispatcher};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::RetryPlan;

/// Shared handles for processing jobs.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub storage: Arc<dyn ObjectStore>,
    pub separator: Arc<dyn Separator>,
    pub dispatcher: WebhookDispatcher,
    pub http: reqwest::Client,
}

impl ProcessingContext {
    /// Create a new processing context.
    pub async fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let storage = S3Store::from_env().await?;

        let secret = std::env::var("WEBHOOK_SIGNING_SECRET").unwrap_or_default();
        if secret.is_empty() {
            return Err(WorkerError::config_error(
                "WEBHOOK_SIGNING_SECRET must be set",
            ));
        }

        let dispatcher = WebhookDispatcher::new(
            SignatureCodec::new(secret),
            BackoffPolicy::from_env(),
            config.webhook_timeout,
        )?;

        // No overall timeout on this client; source fetches are bounded by
        // the byte cap and the job deadline instead.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WorkerError::config_error(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            storage: Arc::new(storage),
            separator: Arc::new(DemucsSeparator::from_env()),
            dispatcher,
            http,
        })
    }
}

/// A failed job together with its terminal record.
#[derive(Debug)]
pub struct JobFailure {
    pub record: JobRecord,
    pub error: WorkerError,
}

/// Run one job end to end.
///
/// On success the returned record is Completed and the success callback
/// has been delivered. On failure the record is Failed with a bounded
/// summary; the caller decides between requeue and the failure callback.
pub async fn process_split(ctx: &ProcessingContext, job: &SplitJob) -> Result<JobRecord, JobFailure> {
    let logger = JobLogger::new(&job.job_id, "pipeline");
    let mut record = JobRecord::new(job.job_id.clone(), job.enqueued_at);

    match run_pipeline(ctx, job, &logger, &mut record).await {
        Ok(()) => {
            logger.completed(&format!(
                "Delivered {} stems for version {} in {}ms",
                record.stems.len(),
                job.version_id,
                record.processing_time_ms()
            ));
            Ok(record)
        }
        Err(error) => {
            logger.failed(&format!("{}: {}", error.kind(), error));
            // Failed is legal from every non-terminal status
            record.fail(format!("{}: {}", error.kind(), error)).ok();
            Err(JobFailure { record, error })
        }
    }
}

async fn run_pipeline(
    ctx: &ProcessingContext,
    job: &SplitJob,
    logger: &JobLogger,
    record: &mut JobRecord,
) -> WorkerResult<()> {
    record.advance(JobStatus::Running)?;
    logger.started(&format!(
        "Separating version {} with model {}",
        job.version_id, job.model
    ));

    tokio::fs::create_dir_all(&ctx.config.work_dir).await?;
    // Held outside the deadline so cleanup runs even on timeout
    let scratch = tempfile::tempdir_in(&ctx.config.work_dir)?;

    let deadline = ctx.config.job_timeout;
    match tokio::time::timeout(deadline, run_stages(ctx, job, logger, record, scratch.path())).await
    {
        Ok(result) => result,
        // Dropping the staged future kills any demucs child via kill_on_drop
        Err(_) => Err(WorkerError::resource_limit(format!(
            "job exceeded wall clock limit of {}s",
            deadline.as_secs()
        ))),
    }
}

async fn run_stages(
    ctx: &ProcessingContext,
    job: &SplitJob,
    logger: &JobLogger,
    record: &mut JobRecord,
    scratch: &std::path::Path,
) -> WorkerResult<()> {
    let input = download_audio(&ctx.http, &job.audio_url, scratch, ctx.config.max_input_bytes).await?;
    logger
        .stage("fetch")
        .progress(&format!("Fetched source audio to {}", input.display()));

    let out_dir = scratch.join("stems");
    tokio::fs::create_dir_all(&out_dir).await?;

    let started = Instant::now();
    let stems = ctx.separator.separate(&input, &out_dir, job.model).await?;
    let elapsed = started.elapsed().as_secs_f64();
    metrics::record_separation_duration(job.model.as_str(), elapsed);
    logger
        .stage("separate")
        .progress(&format!("Separated {} stems in {:.1}s", stems.len(), elapsed));

    let mut output_bytes = 0u64;
    for stem in &stems {
        output_bytes += tokio::fs::metadata(&stem.path).await?.len();
    }
    if output_bytes > ctx.config.max_output_bytes {
        return Err(WorkerError::resource_limit(format!(
            "separated stems total {} bytes, over the {} byte cap",
            output_bytes, ctx.config.max_output_bytes
        )));
    }

    record.advance(JobStatus::Uploading)?;
    let upload_log = logger.stage("upload");
    let mut infos = Vec::with_capacity(stems.len());
    for stem in &stems {
        infos.push(upload_stem(ctx, job, &upload_log, stem).await?);
    }
    record.stems = infos.clone();

    record.advance(JobStatus::Delivering)?;
    let payload = WebhookPayload::completed(&job.version_id, record.processing_time_ms(), infos);

    match ctx.dispatcher.deliver(&job.webhook_url, &payload).await? {
        DeliveryOutcome::Delivered { attempts } => {
            metrics::record_webhook_attempts(attempts);
            metrics::record_webhook_delivery("delivered");
            record.advance(JobStatus::Completed)?;
            Ok(())
        }
        DeliveryOutcome::Rejected { status, attempts } => {
            metrics::record_webhook_attempts(attempts);
            metrics::record_webhook_delivery("rejected");
            Err(WorkerError::DeliveryRejected(status))
        }
        DeliveryOutcome::Exhausted {
            attempts,
            last_error,
        } => {
            metrics::record_webhook_attempts(attempts);
            metrics::record_webhook_delivery("exhausted");
            Err(WorkerError::DeliveryFailed {
                attempts,
                last_error,
            })
        }
    }
}

/// Checksum, probe, and upload one stem, returning its callback metadata.
async fn upload_stem(
    ctx: &ProcessingContext,
    job: &SplitJob,
    logger: &JobLogger,
    stem: &SeparatedStem,
) -> WorkerResult<StemInfo> {
    let checksum = sha256_file(&stem.path).await?;
    let size = tokio::fs::metadata(&stem.path).await?.len();

    // A stem that will not probe is still deliverable; report it with a
    // zero duration instead of failing the whole job.
    let duration = match probe_audio(&stem.path).await {
        Ok(info) => info.duration,
        Err(e) => {
            logger.warning(&format!("ffprobe failed for {}: {}", stem.path.display(), e));
            0.0
        }
    };

    let key = format!("{}/{}.wav", job.version_id, stem.stem_type.as_str());
    let plan = RetryPlan::new("stem_upload")
        .with_tries(3)
        .with_first_wait(Duration::from_millis(500));

    if let Err(spent) = plan
        .run(|| ctx.storage.upload_file(&stem.path, &key, "audio/wav"))
        .await
    {
        logger.warning(&format!(
            "Upload of {} gave up after {} tries: {}",
            key, spent.tries, spent.last_error
        ));
        return Err(WorkerError::Storage(spent.last_error));
    }

    logger.progress(&format!("Uploaded {} stem as {}", stem.stem_type, key));

    Ok(StemInfo {
        stem_type: stem.stem_type,
        name: stem.stem_type.display_name().to_string(),
        url: ctx.storage.object_url(&key),
        size,
        duration,
        checksum,
    })
}

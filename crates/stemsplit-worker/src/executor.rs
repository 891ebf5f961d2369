//! Consumer-group executor.
//!
//! Owns the three background loops of a worker process: the consume loop
//! that pulls fresh deliveries, a claim scan that steals messages from
//! crashed consumers, and the heartbeat that keeps this worker visible to
//! `/queue/status`. Each job runs on its own task behind a semaphore of
//! `max_concurrent_jobs` slots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use stemsplit_models::WebhookPayload;
use stemsplit_queue::{JobQueue, SplitJob, HEARTBEAT_TTL_SECS};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::processor::{process_split, JobFailure, ProcessingContext};
use crate::retry::FailureStreak;

pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    slots: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4().simple());

        Self {
            config,
            queue: Arc::new(queue),
            slots,
            shutdown,
            consumer_name,
        }
    }

    /// Run until ctrl-c, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Executor '{}' up, {} job slots",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let ctx = Arc::new(ProcessingContext::new(self.config.clone()).await?);

        let mut shutdown_rx = self.shutdown.subscribe();

        // Broadcast shutdown on Ctrl-C
        let shutdown_tx = self.shutdown.clone();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received");
                let _ = shutdown_tx.send(true);
            }
        });

        // Periodically claim jobs orphaned by crashed workers
        let claim_queue = Arc::clone(&self.queue);
        let claim_consumer = self.consumer_name.clone();
        let claim_ctx = Arc::clone(&ctx);
        let claim_slots = Arc::clone(&self.slots);
        let mut claim_shutdown = self.shutdown.subscribe();
        let claim_interval = self.config.claim_interval;
        let claim_min_idle_ms = self.config.claim_min_idle.as_millis() as u64;

        let claim_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = claim_shutdown.changed() => {
                        if *claim_shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match claim_queue.claim_pending(&claim_consumer, claim_min_idle_ms, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} orphaned jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let ctx = Arc::clone(&claim_ctx);
                                    let queue = Arc::clone(&claim_queue);
                                    let permit = match claim_slots.clone().acquire_owned().await {
                                        Ok(permit) => permit,
                                        Err(_) => break,
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::handle_delivery(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Claim scan failed: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Keep the heartbeat key alive so /queue/status can count this worker
        let hb_queue = Arc::clone(&self.queue);
        let hb_consumer = self.consumer_name.clone();
        let mut hb_shutdown = self.shutdown.subscribe();
        let heartbeat_task = tokio::spawn(async move {
            // Refresh at a third of the TTL so one missed beat is survivable
            let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_TTL_SECS / 3));
            let mut failures = FailureStreak::new(3);
            loop {
                tokio::select! {
                    _ = hb_shutdown.changed() => {
                        if *hb_shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match hb_queue.heartbeat(&hb_consumer).await {
                            Ok(()) => failures.note_success(),
                            Err(e) => {
                                if failures.note_failure() {
                                    warn!("Heartbeat refresh failed: {}", e);
                                }
                            }
                        }
                    }
                }
            }
        });

        // Foreground: pull fresh deliveries until told to stop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Stopping consume loop");
                        break;
                    }
                }
                result = self.pull_jobs(&ctx) => {
                    if let Err(e) = result {
                        error!("Consume failed: {}", e);
                        // Broker trouble; pause before the next read
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        signal_task.abort();
        claim_task.abort();
        heartbeat_task.abort();

        info!("Draining in-flight jobs");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.drain_in_flight()).await;

        info!("Executor stopped");
        Ok(())
    }

    /// One XREADGROUP round: pull up to the free slot count and spawn a
    /// task per delivery.
    async fn pull_jobs(&self, ctx: &Arc<ProcessingContext>) -> WorkerResult<()> {
        let free = self.slots.available_permits();
        if free == 0 {
            // Every slot is occupied; poll again shortly
            tokio::time::sleep(Duration::from_millis(200)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(
                &self.consumer_name,
                1000, // Block for 1 second
                free.min(5),
            )
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Pulled {} deliveries", jobs.len());

        for (message_id, job) in jobs {
            let ctx = Arc::clone(ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("job slots closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::handle_delivery(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute one delivery of a job, deciding between ack, requeue, and DLQ.
    async fn handle_delivery(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: SplitJob,
    ) {
        let job_id = job.job_id.to_string();
        info!("Executing job {} (message {})", job_id, message_id);

        // Redelivery of a job whose callback already went out: ack and stop
        // so the endpoint never sees a second outcome.
        match queue.was_delivered(&job_id).await {
            Ok(true) => {
                info!("Job {} already delivered, acking redelivery", job_id);
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Ack of redelivered job {} failed: {}", job_id, e);
                }
                return;
            }
            Ok(false) => {}
            Err(e) => {
                // Cannot tell whether the callback went out; leave the message
                // pending rather than risk a duplicate delivery.
                warn!("Delivered-check failed for job {}: {}", job_id, e);
                return;
            }
        }

        match process_split(&ctx, &job).await {
            Ok(record) => {
                // The delivered marker goes down before the ack; a crash in
                // between is resolved by the was_delivered check above.
                if let Err(e) = queue.mark_delivered(&job_id).await {
                    error!("Delivered marker for job {} failed: {}", job_id, e);
                    return;
                }
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Ack of job {} failed: {}", job_id, e);
                }
                queue.record_completed().await.ok();
                metrics::record_job_completed(job.model.as_str());
                info!(
                    "Job {} completed in {}ms",
                    job_id,
                    record.processing_time_ms()
                );
            }
            Err(failure) => {
                error!(
                    "Job {} failed ({}): {}",
                    job_id,
                    failure.error.kind(),
                    failure.error
                );

                if failure.error.is_retryable() {
                    let requeues = queue.increment_requeue(&message_id).await.unwrap_or(999);
                    if requeues <= queue.max_requeues() {
                        warn!(
                            "Job {} will be redelivered (requeue {}/{})",
                            job_id,
                            requeues,
                            queue.max_requeues()
                        );
                        // Not acked; the claim scan hands it to a worker later.
                        return;
                    }
                    warn!("Job {} exceeded max requeues, failing terminally", job_id);
                }

                Self::finalize_failure(&ctx, &queue, &message_id, &job, failure).await;
            }
        }
    }

    /// Deliver the failure callback and dead letter the message.
    ///
    /// A failure callback that cannot be delivered is logged and dropped;
    /// the job still moves to the DLQ so it stops consuming attempts.
    async fn finalize_failure(
        ctx: &ProcessingContext,
        queue: &JobQueue,
        message_id: &str,
        job: &SplitJob,
        failure: JobFailure,
    ) {
        let job_id = job.job_id.to_string();
        let summary = format!("{}: {}", failure.error.kind(), failure.error);
        let payload = WebhookPayload::failed(
            &job.version_id,
            failure.record.processing_time_ms(),
            &summary,
        );

        match ctx.dispatcher.deliver(&job.webhook_url, &payload).await {
            Ok(outcome) if outcome.is_delivered() => {
                // Failure callbacks count against redelivery dedup too
                queue.mark_delivered(&job_id).await.ok();
            }
            Ok(outcome) => {
                warn!(
                    "Failure callback for job {} not delivered: {:?}",
                    job_id, outcome
                );
            }
            Err(e) => {
                warn!("Failure callback for job {} errored: {}", job_id, e);
            }
        }

        if let Err(e) = queue.dead_letter(message_id, job, &summary).await {
            error!("Dead letter of job {} failed: {}", job_id, e);
            return;
        }
        queue.record_failed().await.ok();
        metrics::record_job_failed(failure.error.kind());
        metrics::record_job_dead_lettered();
    }

    /// Block until every slot is free again.
    async fn drain_in_flight(&self) {
        loop {
            if self.slots.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Ask the loops to stop. `run` drains and returns shortly after.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

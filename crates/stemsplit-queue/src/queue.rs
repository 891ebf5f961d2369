//! Redis Streams broker client.
//!
//! One stream carries job descriptors, a consumer group fans them out to
//! workers, and a second stream collects dead letters. Around those live
//! the small keys that make delivery exactly-once-ish: an enqueue dedup
//! key, the admission ledger, delivered-callback markers, requeue counters,
//! and worker heartbeats.

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::SplitJob;

/// TTL for job-id dedup keys. Broker-level retries of one descriptor
/// arrive well inside this window.
pub const DEDUP_TTL_SECS: u64 = 3600;
/// TTL for the admission idempotency ledger.
pub const ADMISSION_TTL_SECS: u64 = 3600;
/// TTL for delivered-callback markers. A redelivery can only arrive while
/// its message is still pending, long before this expires.
pub const DELIVERED_TTL_SECS: u64 = 86_400;
/// TTL for whole-job requeue counters.
pub const REQUEUE_COUNT_TTL_SECS: i64 = 86_400;
/// TTL for worker heartbeat keys.
pub const HEARTBEAT_TTL_SECS: u64 = 15;

/// Broker connection and stream naming knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    pub stream_name: String,
    pub consumer_group: String,
    pub dlq_stream_name: String,
    /// Max whole-job requeues before DLQ
    pub max_requeues: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "stemsplit:jobs".to_string(),
            consumer_group: "stemsplit:workers".to_string(),
            dlq_stream_name: "stemsplit:dlq".to_string(),
            max_requeues: 2,
        }
    }
}

impl QueueConfig {
    /// Read every knob from the environment, defaulting where unset.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "stemsplit:jobs".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "stemsplit:workers".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "stemsplit:dlq".to_string()),
            max_requeues: std::env::var("QUEUE_MAX_REQUEUES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }
}

fn dedup_key(job_id: &str) -> String {
    format!("stemsplit:dedup:{}", job_id)
}

fn admission_key(key: &str) -> String {
    format!("stemsplit:admitted:{}", key)
}

fn delivered_key(job_id: &str) -> String {
    format!("stemsplit:delivered:{}", job_id)
}

fn requeue_key(message_id: &str) -> String {
    format!("stemsplit:requeue:{}", message_id)
}

fn heartbeat_key(consumer_name: &str) -> String {
    format!("stemsplit:worker:{}", consumer_name)
}

/// Handle to the job stream and its bookkeeping keys.
///
/// Both binaries hold this behind an `Arc`; it is the only coupling to the
/// concrete broker.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Client configured from the environment.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Create the consumer group, tolerating one that already exists.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(_) => info!("Consumer group {} created", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group {} was already there", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Broker(e)),
        }

        Ok(())
    }

    /// Round-trip to Redis, for readiness checks.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Enqueue a job. Idempotent on the job id: re-enqueueing a descriptor
    /// whose id was already accepted returns the original message id
    /// without adding a second stream entry.
    pub async fn enqueue(&self, job: &SplitJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let dedup = dedup_key(job.job_id.as_str());
        if let Some(existing) = conn.get::<_, Option<String>>(&dedup).await? {
            warn!("Duplicate enqueue of job {} ignored", job.job_id);
            return Ok(existing);
        }

        let payload = serde_json::to_string(job)?;
        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("job_id")
            .arg(job.job_id.as_str())
            .query_async(&mut conn)
            .await?;

        conn.set_ex::<_, _, ()>(&dedup, &message_id, DEDUP_TTL_SECS)
            .await?;

        info!("Enqueued job {} as message {}", job.job_id, message_id);

        Ok(message_id)
    }

    /// Record this job in the admission idempotency ledger.
    ///
    /// Returns `Some(existing_job_id)` when an earlier submission of the
    /// same logical request (same admission key) is still inside the ledger
    /// window; the caller should answer with that id instead of enqueueing.
    pub async fn claim_admission(&self, job: &SplitJob) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = admission_key(&job.admission_key());
        let claimed: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(job.job_id.as_str())
            .arg("NX")
            .arg("EX")
            .arg(ADMISSION_TTL_SECS)
            .query_async(&mut conn)
            .await?;

        if claimed.is_some() {
            return Ok(None);
        }

        // Lost the race or a replayed submission; read the winning id. The
        // ledger entry may expire between SET and GET, in which case the
        // request proceeds as new.
        let existing: Option<String> = conn.get(&key).await?;
        if let Some(ref id) = existing {
            info!(
                "Replayed admission for key {} maps to job {}",
                job.admission_key(),
                id
            );
        }
        Ok(existing)
    }

    /// Ack and delete a message once its outcome is settled.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        // XACK alone leaves the entry in the stream; trim it too
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job message: {}", message_id);
        Ok(())
    }

    /// Park a job in the dead letter stream and settle the original message.
    pub async fn dead_letter(
        &self,
        message_id: &str,
        job: &SplitJob,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!("Moved job {} to DLQ: {}", job.job_id, error);
        Ok(())
    }

    /// Entries waiting in the job stream.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Entries parked in the dead letter stream.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Read new deliveries for this consumer, as (message_id, job) pairs.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, SplitJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // fresh deliveries, not this consumer's backlog
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                match Self::decode_entry(&entry) {
                    Some(job) => {
                        debug!("Consumed job {} from stream", job.job_id);
                        jobs.push((entry.id, job));
                    }
                    None => {
                        // A poison entry would redeliver forever; ack it away
                        self.ack(&entry.id).await.ok();
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// Steal messages another consumer left pending for at least
    /// `min_idle_ms`. That floor must exceed the worker wall-clock cap or
    /// in-flight jobs get stolen.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, SplitJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let claimed: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0") // scan from the start of the pending entries list
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for entry in claimed.ids {
            match Self::decode_entry(&entry) {
                Some(job) => {
                    info!("Claimed pending job {} from stream", job.job_id);
                    jobs.push((entry.id, job));
                }
                None => {
                    self.ack(&entry.id).await.ok();
                }
            }
        }

        Ok(jobs)
    }

    /// Pull the `job` JSON out of one stream entry.
    fn decode_entry(entry: &redis::streams::StreamId) -> Option<SplitJob> {
        let bytes = match entry.map.get("job") {
            Some(redis::Value::BulkString(bytes)) => bytes,
            _ => {
                warn!("Stream entry {} has no job field", entry.id);
                return None;
            }
        };
        match serde_json::from_str(&String::from_utf8_lossy(bytes)) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!("Stream entry {} does not decode as a job: {}", entry.id, e);
                None
            }
        }
    }

    /// Get the whole-job requeue count for a message.
    pub async fn requeue_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let count: Option<u32> = conn.get(requeue_key(message_id)).await?;
        Ok(count.unwrap_or(0))
    }

    /// Increment the whole-job requeue count for a message.
    pub async fn increment_requeue(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = requeue_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, REQUEUE_COUNT_TTL_SECS).await?;
        Ok(count)
    }

    /// Max whole-job requeues from config.
    pub fn max_requeues(&self) -> u32 {
        self.config.max_requeues
    }

    /// Durably record that this job's callback was delivered.
    ///
    /// Written after the callback succeeds and before the message is
    /// acked, so a crash in between leaves a marker, not a duplicate
    /// delivery.
    pub async fn mark_delivered(&self, job_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(delivered_key(job_id), "1", DELIVERED_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Whether this job's callback was already delivered.
    pub async fn was_delivered(&self, job_id: &str) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.exists(delivered_key(job_id)).await?;
        Ok(exists)
    }

    /// Bump the completed-jobs counter.
    pub async fn record_completed(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.incr::<_, _, ()>("stemsplit:stats:completed", 1).await?;
        Ok(())
    }

    /// Bump the failed-jobs counter.
    pub async fn record_failed(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.incr::<_, _, ()>("stemsplit:stats:failed", 1).await?;
        Ok(())
    }

    /// Jobs completed since the counter was created.
    pub async fn completed_count(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: Option<u64> = conn.get("stemsplit:stats:completed").await?;
        Ok(count.unwrap_or(0))
    }

    /// Jobs finally failed since the counter was created.
    pub async fn failed_count(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: Option<u64> = conn.get("stemsplit:stats:failed").await?;
        Ok(count.unwrap_or(0))
    }

    /// Refresh this worker's heartbeat key.
    pub async fn heartbeat(&self, consumer_name: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(heartbeat_key(consumer_name), "1", HEARTBEAT_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Count workers with a live heartbeat.
    pub async fn active_workers(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut cursor: u64 = 0;
        let mut total: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("stemsplit:worker:*")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            total += keys.len() as u64;
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(total)
    }
}

//! Redis Streams job queue for separation jobs.
//!
//! A consumer group over one stream gives at-least-once delivery to any
//! number of workers. Around it sit the keys that tighten that guarantee:
//! enqueue dedup, the admission ledger, per-job requeue counters, the
//! delivered-callback marker, and worker heartbeats. Messages nobody
//! acked come back through pending-entry claiming, and jobs that keep
//! failing land in a dead letter stream.

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::SplitJob;
pub use queue::{
    JobQueue, QueueConfig, ADMISSION_TTL_SECS, DEDUP_TTL_SECS, DELIVERED_TTL_SECS,
    HEARTBEAT_TTL_SECS, REQUEUE_COUNT_TTL_SECS,
};

//! Stem separation worker.
//!
//! Drains the job stream the admission API feeds, runs each job's pipeline
//! (fetch, separate, upload) under bounded concurrency, signs and delivers
//! the result callback, and requeues or dead-letters whatever fails. Crash
//! recovery reclaims jobs whose worker died mid-flight.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod retry;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use executor::JobExecutor;
pub use processor::{process_split, JobFailure, ProcessingContext};

//! Bounded retries for storage calls, and failure-streak log gating
//! for background loops.
//!
//! Webhook deliveries never come through here; the dispatcher applies
//! its own jittered backoff per attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Fixed-size retry plan with doubling waits.
///
/// `tries` counts every attempt including the first. The wait after a
/// failed try starts at `first_wait` and doubles, capped at `max_wait`.
#[derive(Debug, Clone)]
pub struct RetryPlan {
    tries: u32,
    first_wait: Duration,
    max_wait: Duration,
    operation: &'static str,
}

impl RetryPlan {
    pub fn new(operation: &'static str) -> Self {
        Self {
            tries: 3,
            first_wait: Duration::from_millis(100),
            max_wait: Duration::from_secs(5),
            operation,
        }
    }

    /// Total number of tries, first included. Clamped to at least one.
    pub fn with_tries(mut self, tries: u32) -> Self {
        self.tries = tries.max(1);
        self
    }

    pub fn with_first_wait(mut self, wait: Duration) -> Self {
        self.first_wait = wait;
        self
    }

    /// Wait inserted after failed try `n` (1-based).
    fn wait_after(&self, n: u32) -> Duration {
        let factor = 2u32.saturating_pow(n.saturating_sub(1));
        self.first_wait.saturating_mul(factor).min(self.max_wait)
    }

    /// Drive `op` until it succeeds or the plan runs out of tries.
    pub async fn run<F, Fut, T, E>(&self, op: F) -> Result<T, RetriesSpent<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut tried = 0u32;
        loop {
            tried += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if tried < self.tries => {
                    let wait = self.wait_after(tried);
                    debug!(
                        "{} try {}/{} failed ({}), next in {:?}",
                        self.operation, tried, self.tries, error, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(error) => {
                    return Err(RetriesSpent {
                        last_error: error,
                        tries: tried,
                    })
                }
            }
        }
    }
}

/// Terminal failure from a spent [`RetryPlan`].
#[derive(Debug)]
pub struct RetriesSpent<E> {
    pub last_error: E,
    pub tries: u32,
}

/// Log gate for background loops that fail in streaks.
///
/// The first `limit` consecutive failures are worth a log line each;
/// after that the gate mutes until a success resets it.
#[derive(Debug)]
pub struct FailureStreak {
    length: u32,
    limit: u32,
}

impl FailureStreak {
    pub fn new(limit: u32) -> Self {
        Self { length: 0, limit }
    }

    /// Count a failure. True when it should still be logged.
    pub fn note_failure(&mut self) -> bool {
        self.length += 1;
        if self.length <= self.limit {
            true
        } else {
            if self.length == self.limit + 1 {
                warn!(
                    "Muting further failure logs after {} consecutive failures",
                    self.limit
                );
            }
            false
        }
    }

    /// Count a success, reopening the gate.
    pub fn note_success(&mut self) {
        if self.length > self.limit {
            debug!("Recovered after {} consecutive failures", self.length);
        }
        self.length = 0;
    }

    pub fn length(&self) -> u32 {
        self.length
    }
}

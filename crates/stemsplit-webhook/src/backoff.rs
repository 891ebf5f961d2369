//! Jittered exponential backoff.

use std::time::Duration;

use rand::Rng;

/// Retry schedule for callback delivery.
///
/// `delay_for_attempt` is pure apart from the jitter draw, so retry
/// behavior is testable without sleeping through real delays.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles from there.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Jitter factor in [0, 1]; each delay moves by at most this fraction.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: std::env::var("WEBHOOK_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
            base_delay: Duration::from_millis(
                std::env::var("WEBHOOK_BASE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.base_delay.as_millis() as u64),
            ),
            max_delay: Duration::from_secs(
                std::env::var("WEBHOOK_MAX_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.max_delay.as_secs()),
            ),
            jitter: std::env::var("WEBHOOK_JITTER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jitter),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to sleep before attempt number `attempt` (0-based; the first
    /// attempt is immediate).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exp = 2_f64.powi((attempt - 1) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);

        let jitter_range = delay_ms * self.jitter;
        let jittered = if jitter_range > 0.0 {
            let offset: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
            (delay_ms + offset).max(0.0)
        } else {
            delay_ms
        };

        Duration::from_millis(jittered as u64)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

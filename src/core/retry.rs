//! Retry policy with exponential backoff.
//!
//! Transient failures are retried after a delay that starts at
//! `initial_delay_ms` and grows by `backoff_multiplier` per attempt, capped
//! at `max_delay_ms`. Permanent failures stop immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{AttemptOutcome, ErrorKind, SpecialistResult, Unavailable};

/// Retry policy for failed specialist attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    5000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Attempts actually allowed (a zero limit still runs once)
    pub fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculate delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempt_limit()
    }

    /// Upper bound on a full attempt sequence: max_attempts x (deadline + max_delay)
    ///
    /// Saturates at `Duration::MAX` for configurations that would overflow.
    pub fn worst_case(&self, deadline: Duration) -> Duration {
        deadline
            .checked_add(Duration::from_millis(self.max_delay_ms))
            .and_then(|per_attempt| per_attempt.checked_mul(self.attempt_limit()))
            .unwrap_or(Duration::MAX)
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of attempts
    ///
    /// `operation` receives the 1-indexed attempt number.
    pub async fn execute<F, Fut, C>(&self, mut operation: F, classify: C) -> SpecialistResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptOutcome>,
        C: Fn(&AttemptOutcome) -> ErrorKind,
    {
        let mut attempt = 1u32;

        loop {
            let outcome = operation(attempt).await;

            if let AttemptOutcome::Success(payload) = outcome {
                debug!(attempt, "Attempt succeeded");
                return SpecialistResult::Succeeded(payload);
            }

            let kind = classify(&outcome);
            if kind == ErrorKind::Permanent || !self.should_retry(attempt) {
                debug!(attempt, ?kind, outcome = %outcome.describe(), "Giving up");
                return SpecialistResult::Unavailable(Unavailable {
                    attempts: attempt,
                    last: outcome,
                });
            }

            let delay = self.delay_for_attempt(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                outcome = %outcome.describe(),
                "Transient failure, retrying"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

//! Attempt and terminal outcomes for specialist invocations.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metric field name -> value, as returned by a specialist
pub type Payload = BTreeMap<String, f64>;

/// Whether a failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
}

/// Errors raised by a specialist invocation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecialistError {
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("upstream returned status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("specialist task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl SpecialistError {
    /// Default transient/permanent split
    ///
    /// Timeouts, connection failures, HTTP 429/502/503 and messages that
    /// mention a timeout or rate limit are transient. Everything else is
    /// permanent.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) | Self::Connection(_) | Self::RateLimited(_) => ErrorKind::Transient,
            Self::Status { code, .. } if matches!(code, 429 | 502 | 503) => ErrorKind::Transient,
            Self::InvalidInput(_) | Self::InvalidPayload(_) | Self::Panicked(_) => {
                ErrorKind::Permanent
            }
            Self::Status { message, .. } | Self::Other(message) => {
                let lower = message.to_lowercase();
                if lower.contains("timeout") || lower.contains("rate limit") {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
        }
    }
}

/// Result of a single attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(Payload),
    TimedOut { after: Duration },
    Failed(SpecialistError),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Human-readable summary (no payload values)
    pub fn describe(&self) -> String {
        match self {
            Self::Success(payload) => format!("succeeded with {} fields", payload.len()),
            Self::TimedOut { after } => format!("timed out after {}ms", after.as_millis()),
            Self::Failed(e) => e.to_string(),
        }
    }
}

/// Default classifier used by the orchestrator
pub fn classify(outcome: &AttemptOutcome) -> ErrorKind {
    match outcome {
        AttemptOutcome::TimedOut { .. } => ErrorKind::Transient,
        AttemptOutcome::Failed(e) => e.kind(),
        // Never asked about successes; treat as terminal
        AttemptOutcome::Success(_) => ErrorKind::Permanent,
    }
}

/// Why a specialist produced no payload
#[derive(Debug, Clone, PartialEq)]
pub struct Unavailable {
    /// Attempts consumed before giving up
    pub attempts: u32,

    /// The last non-success outcome
    pub last: AttemptOutcome,
}

/// Terminal outcome of one specialist in one run
#[derive(Debug, Clone, PartialEq)]
pub enum SpecialistResult {
    Succeeded(Payload),
    Unavailable(Unavailable),
}

impl SpecialistResult {
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Succeeded(p) => Some(p),
            Self::Unavailable(_) => None,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

//! Specialist interfaces.
//!
//! A specialist computes a fixed subset of the report's metric fields from
//! the whole analysis request. The orchestrator only sees the trait; the
//! built-in specialists score locally, the HTTP specialist delegates to a
//! remote service.

pub mod builtin;
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ResolvedConfig, SpecialistConfig, SpecialistKind};
use crate::core::deadline::guard;
use crate::core::RetryPolicy;
use crate::domain::{AnalysisRequest, AttemptOutcome, Payload, SpecialistError};

pub use builtin::{
    builtin_roster, builtin_specialist, CompletionSpecialist, EngagementSpecialist,
    MarketSpecialist, MasterySpecialist, RatingSpecialist, BUILTIN_NAMES,
};
pub use http::HttpSpecialist;

/// Default per-attempt deadline
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// A metric field a specialist owns, with inclusive bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricField {
    pub name: String,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_field_max")]
    pub max: f64,
}

fn default_field_max() -> f64 {
    1.0
}

impl MetricField {
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
        }
    }

    /// A rate in [0, 1]
    pub fn unit(name: impl Into<String>) -> Self {
        Self::new(name, 0.0, 1.0)
    }
}

/// Trait for metric specialists
#[async_trait]
pub trait Specialist: Send + Sync {
    /// Unique specialist name
    fn name(&self) -> &str;

    /// Fields this specialist owns in the merged report
    fn fields(&self) -> &[MetricField];

    /// Compute the owned fields for `request`
    async fn invoke(&self, request: &AnalysisRequest) -> Result<Payload, SpecialistError>;
}

/// Check a payload against declared fields
///
/// Every declared field must be present, finite and within bounds.
/// Undeclared keys are dropped.
pub fn validate_payload(fields: &[MetricField], payload: Payload) -> Result<Payload, SpecialistError> {
    let mut validated = Payload::new();

    for field in fields {
        let value = payload.get(&field.name).copied().ok_or_else(|| {
            SpecialistError::InvalidPayload(format!("missing field '{}'", field.name))
        })?;

        if !value.is_finite() || value < field.min || value > field.max {
            return Err(SpecialistError::InvalidPayload(format!(
                "field '{}' = {} outside [{}, {}]",
                field.name, value, field.min, field.max
            )));
        }

        validated.insert(field.name.clone(), value);
    }

    Ok(validated)
}

/// One roster entry: a specialist plus its deadline and retry policy
#[derive(Clone)]
pub struct SpecialistCall {
    pub name: String,
    pub specialist: Arc<dyn Specialist>,
    pub deadline: Duration,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for SpecialistCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistCall")
            .field("name", &self.name)
            .field("deadline", &self.deadline)
            .field("retry", &self.retry)
            .finish()
    }
}

impl SpecialistCall {
    /// Wrap a specialist with the default deadline and retry policy
    pub fn new(specialist: Arc<dyn Specialist>) -> Self {
        Self {
            name: specialist.name().to_string(),
            specialist,
            deadline: DEFAULT_DEADLINE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn fields(&self) -> &[MetricField] {
        self.specialist.fields()
    }

    /// One deadline-guarded attempt, with payload validation
    pub async fn attempt(&self, request: Arc<AnalysisRequest>) -> AttemptOutcome {
        let specialist = Arc::clone(&self.specialist);
        guard(
            async move {
                let payload = specialist.invoke(&request).await?;
                validate_payload(specialist.fields(), payload)
            },
            self.deadline,
        )
        .await
    }
}

/// Build the roster described by the configuration
///
/// With no specialists configured, the five built-ins are used.
pub fn build_roster(config: &ResolvedConfig) -> Result<Vec<SpecialistCall>> {
    let settings = &config.orchestrator;

    if config.specialists.is_empty() {
        return Ok(builtin_roster()
            .into_iter()
            .map(|s| {
                SpecialistCall::new(s)
                    .with_deadline(settings.deadline)
                    .with_retry(settings.retry.clone())
            })
            .collect());
    }

    config
        .specialists
        .iter()
        .map(|entry| build_call(entry, settings.deadline, &settings.retry))
        .collect()
}

fn build_call(
    entry: &SpecialistConfig,
    default_deadline: Duration,
    default_retry: &RetryPolicy,
) -> Result<SpecialistCall> {
    let specialist: Arc<dyn Specialist> = match &entry.kind {
        SpecialistKind::Builtin => builtin_specialist(&entry.name).with_context(|| {
            format!(
                "Unknown built-in specialist '{}' (expected one of: {})",
                entry.name,
                BUILTIN_NAMES.join(", ")
            )
        })?,
        SpecialistKind::Http { url, fields } => {
            if fields.is_empty() {
                anyhow::bail!("HTTP specialist '{}' declares no fields", entry.name);
            }
            Arc::new(HttpSpecialist::new(entry.name.clone(), url.clone(), fields.clone()))
        }
    };

    let deadline = entry
        .deadline_ms
        .map(Duration::from_millis)
        .unwrap_or(default_deadline);
    let retry = entry.retry.clone().unwrap_or_else(|| default_retry.clone());

    Ok(SpecialistCall::new(specialist)
        .with_deadline(deadline)
        .with_retry(retry))
}

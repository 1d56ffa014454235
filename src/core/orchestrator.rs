//! Main orchestrator for specialist fan-out.
//!
//! Runs every specialist in the roster concurrently, each behind its own
//! deadline guard and retry policy, waits for all of them, and merges the
//! survivors into one fixed-shape report. A specialist that ends up
//! unavailable only degrades its own fields to zero.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    classify, AnalysisRequest, AttemptOutcome, MergedReport, SpecialistError, SpecialistResult,
    Unavailable, NUMBER_OF_LEARNERS,
};
use crate::specialists::{MetricField, SpecialistCall};

use super::recorder::ExecutionRecorder;
use super::session::{RunMeta, SessionStore};

/// Value used for fields whose owner is unavailable
pub const DEFAULT_METRIC_VALUE: f64 = 0.0;

/// Run-level and roster construction errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    #[error("roster must contain at least one specialist")]
    EmptyRoster,

    #[error("specialist '{0}' appears more than once in the roster")]
    DuplicateSpecialist(String),

    #[error("field '{field}' is declared by both '{first}' and '{second}'")]
    DuplicateField {
        field: String,
        first: String,
        second: String,
    },

    #[error("session id must not be empty")]
    EmptySessionId,
}

/// Terminal result of one specialist in a run
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialistReport {
    pub name: String,
    pub result: SpecialistResult,
    pub elapsed: Duration,
}

/// Merged report plus per-specialist results, in roster order
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: MergedReport,
    pub specialists: Vec<SpecialistReport>,
}

impl RunOutcome {
    /// Names of specialists whose fields were defaulted
    pub fn unavailable(&self) -> Vec<String> {
        self.specialists
            .iter()
            .filter(|s| !s.result.is_succeeded())
            .map(|s| s.name.clone())
            .collect()
    }
}

/// Merge terminal results into a report
///
/// `owned` pairs each specialist's declared fields with its result, in
/// roster order. Pure: identical inputs give identical reports.
pub fn merge<'a, I>(owned: I, learner_count: usize) -> MergedReport
where
    I: IntoIterator<Item = (&'a [MetricField], &'a SpecialistResult)>,
{
    let mut report = MergedReport::new();
    report.insert(NUMBER_OF_LEARNERS, learner_count as f64);

    for (fields, result) in owned {
        let payload = result.payload();
        for field in fields {
            let value = payload
                .and_then(|p| p.get(&field.name).copied())
                .unwrap_or(DEFAULT_METRIC_VALUE);
            report.insert(field.name.clone(), value);
        }
    }

    report
}

/// Concurrent specialist orchestrator
pub struct Orchestrator {
    roster: Vec<SpecialistCall>,
    recorder: Arc<ExecutionRecorder>,
}

impl Orchestrator {
    /// Create an orchestrator over a fixed roster
    ///
    /// Every field must have exactly one owner, and `numberOfLearners` is
    /// reserved for the orchestrator itself.
    pub fn new(
        roster: Vec<SpecialistCall>,
        recorder: Arc<ExecutionRecorder>,
    ) -> Result<Self, OrchestratorError> {
        if roster.is_empty() {
            return Err(OrchestratorError::EmptyRoster);
        }

        let mut names = HashSet::new();
        let mut owners: Vec<(&str, &str)> = vec![(NUMBER_OF_LEARNERS, "orchestrator")];

        for call in &roster {
            if !names.insert(call.name.as_str()) {
                return Err(OrchestratorError::DuplicateSpecialist(call.name.clone()));
            }

            for field in call.fields() {
                if let Some((_, first)) = owners.iter().find(|(f, _)| *f == field.name) {
                    return Err(OrchestratorError::DuplicateField {
                        field: field.name.clone(),
                        first: first.to_string(),
                        second: call.name.clone(),
                    });
                }
                owners.push((field.name.as_str(), call.name.as_str()));
            }
        }

        Ok(Self { roster, recorder })
    }

    pub fn roster(&self) -> &[SpecialistCall] {
        &self.roster
    }

    /// Every field a report from this orchestrator contains, sorted
    pub fn declared_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = std::iter::once(NUMBER_OF_LEARNERS.to_string())
            .chain(
                self.roster
                    .iter()
                    .flat_map(|c| c.fields().iter().map(|f| f.name.clone())),
            )
            .collect();
        fields.sort();
        fields
    }

    /// Run all specialists and return the merged report
    pub async fn run(
        &self,
        sessions: &mut SessionStore,
        session_id: &str,
        request: AnalysisRequest,
        meta: &RunMeta,
    ) -> Result<MergedReport, OrchestratorError> {
        self.run_detailed(sessions, session_id, request, meta)
            .await
            .map(|outcome| outcome.report)
    }

    /// Run all specialists, keeping each one's terminal result
    #[instrument(
        skip(self, sessions, request, meta),
        fields(session_id = %session_id, learners = request.learner_count())
    )]
    pub async fn run_detailed(
        &self,
        sessions: &mut SessionStore,
        session_id: &str,
        request: AnalysisRequest,
        meta: &RunMeta,
    ) -> Result<RunOutcome, OrchestratorError> {
        if session_id.trim().is_empty() {
            return Err(OrchestratorError::EmptySessionId);
        }

        let context = sessions.get_or_create(session_id, meta);
        info!(
            module_id = %context.module_id,
            cohort = %context.cohort,
            previous_runs = context.previous_runs.len(),
            specialists = self.roster.len(),
            "Starting analysis run"
        );

        let learner_count = request.learner_count();
        let request = Arc::new(request);
        let mut join_set = JoinSet::new();

        for (index, call) in self.roster.iter().enumerate() {
            let call = call.clone();
            let request = Arc::clone(&request);
            let recorder = Arc::clone(&self.recorder);

            join_set.spawn(async move {
                let (result, elapsed) = run_specialist(&call, request, recorder).await;
                (index, result, elapsed)
            });
        }

        let mut slots: Vec<Option<(SpecialistResult, Duration)>> = vec![None; self.roster.len()];

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result, elapsed)) => slots[index] = Some((result, elapsed)),
                Err(e) => warn!(error = %e, "Specialist task did not complete"),
            }
        }

        let specialists: Vec<SpecialistReport> = self
            .roster
            .iter()
            .zip(slots)
            .map(|(call, slot)| {
                let (result, elapsed) = slot.unwrap_or_else(|| {
                    let lost = SpecialistResult::Unavailable(Unavailable {
                        attempts: 0,
                        last: AttemptOutcome::Failed(SpecialistError::Panicked(
                            "task did not complete".into(),
                        )),
                    });
                    (lost, Duration::ZERO)
                });
                SpecialistReport {
                    name: call.name.clone(),
                    result,
                    elapsed,
                }
            })
            .collect();

        for s in &specialists {
            match &s.result {
                SpecialistResult::Succeeded(_) => {
                    info!(specialist = %s.name, elapsed_ms = s.elapsed.as_millis() as u64, "Specialist succeeded")
                }
                SpecialistResult::Unavailable(u) => warn!(
                    specialist = %s.name,
                    attempts = u.attempts,
                    reason = %u.last.describe(),
                    "Specialist unavailable, using defaults"
                ),
            }
        }

        let report = merge(
            self.roster
                .iter()
                .zip(&specialists)
                .map(|(call, s)| (call.fields(), &s.result)),
            learner_count,
        );

        sessions.append_run(session_id, report.clone());

        let outcome = RunOutcome {
            report,
            specialists,
        };
        info!(
            unavailable = outcome.unavailable().len(),
            "Analysis run completed"
        );

        Ok(outcome)
    }
}

/// Retry loop for one specialist, bounded by its worst-case duration
async fn run_specialist(
    call: &SpecialistCall,
    request: Arc<AnalysisRequest>,
    recorder: Arc<ExecutionRecorder>,
) -> (SpecialistResult, Duration) {
    let bound = call.retry.worst_case(call.deadline);
    run_bounded(call, request, recorder, bound).await
}

async fn run_bounded(
    call: &SpecialistCall,
    request: Arc<AnalysisRequest>,
    recorder: Arc<ExecutionRecorder>,
    bound: Duration,
) -> (SpecialistResult, Duration) {
    let started = Instant::now();
    let begun = AtomicU32::new(0);
    let finished = AtomicU32::new(0);
    // Offset of the latest attempt's start from `started`, in milliseconds
    let latest_start_ms = AtomicU64::new(0);

    let sequence = call.retry.execute(
        |attempt| {
            let call = call.clone();
            let request = Arc::clone(&request);
            let recorder = Arc::clone(&recorder);
            let (begun, finished, latest_start_ms) = (&begun, &finished, &latest_start_ms);
            async move {
                let attempt_started = Instant::now();
                latest_start_ms.store(
                    attempt_started.duration_since(started).as_millis() as u64,
                    Ordering::SeqCst,
                );
                begun.fetch_add(1, Ordering::SeqCst);

                let outcome = call.attempt(request).await;
                recorder.record(&call.name, outcome.is_success(), attempt_started.elapsed());
                finished.fetch_add(1, Ordering::SeqCst);
                debug!(
                    specialist = %call.name,
                    attempt,
                    outcome = %outcome.describe(),
                    "Attempt finished"
                );
                outcome
            }
        },
        classify,
    );

    let result = match tokio::time::timeout(bound, sequence).await {
        Ok(result) => result,
        Err(_) => {
            let attempts = begun.load(Ordering::SeqCst);
            if attempts > finished.load(Ordering::SeqCst) {
                // The interrupted attempt counts as a failure
                let in_flight = started
                    .elapsed()
                    .saturating_sub(Duration::from_millis(latest_start_ms.load(Ordering::SeqCst)));
                recorder.record(&call.name, false, in_flight);
            }
            warn!(
                specialist = %call.name,
                attempts,
                bound_ms = bound.as_millis() as u64,
                "Attempt sequence exceeded hard bound"
            );
            SpecialistResult::Unavailable(Unavailable {
                attempts,
                last: AttemptOutcome::TimedOut { after: bound },
            })
        }
    };

    (result, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RetryPolicy;
    use crate::domain::Payload;
    use crate::specialists::Specialist;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        fields: Vec<MetricField>,
    }

    #[async_trait]
    impl Specialist for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn fields(&self) -> &[MetricField] {
            &self.fields
        }

        async fn invoke(&self, _request: &AnalysisRequest) -> Result<Payload, SpecialistError> {
            Ok(self.fields.iter().map(|f| (f.name.clone(), f.max)).collect())
        }
    }

    fn call(name: &'static str, fields: &[&str]) -> SpecialistCall {
        SpecialistCall::new(Arc::new(Fixed {
            name,
            fields: fields.iter().map(|f| MetricField::unit(*f)).collect(),
        }))
    }

    #[test]
    fn test_roster_validation() {
        let recorder = Arc::new(ExecutionRecorder::new());

        assert!(matches!(
            Orchestrator::new(vec![], Arc::clone(&recorder)),
            Err(OrchestratorError::EmptyRoster)
        ));
        assert!(matches!(
            Orchestrator::new(vec![call("a", &["x"]), call("a", &["y"])], Arc::clone(&recorder)),
            Err(OrchestratorError::DuplicateSpecialist(_))
        ));
        assert!(matches!(
            Orchestrator::new(vec![call("a", &["x"]), call("b", &["x"])], Arc::clone(&recorder)),
            Err(OrchestratorError::DuplicateField { .. })
        ));
        assert!(matches!(
            Orchestrator::new(vec![call("a", &[NUMBER_OF_LEARNERS])], recorder),
            Err(OrchestratorError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_declared_fields() {
        let orchestrator = Orchestrator::new(
            vec![call("a", &["x"]), call("b", &["y", "w"])],
            Arc::new(ExecutionRecorder::new()),
        )
        .unwrap();
        assert_eq!(
            orchestrator.declared_fields(),
            vec!["numberOfLearners", "w", "x", "y"]
        );
        let names: Vec<&str> = orchestrator.roster().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_merge_defaults_unavailable_fields() {
        let x = [MetricField::unit("x")];
        let y = [MetricField::unit("y")];
        let ok = SpecialistResult::Succeeded([("x".to_string(), 0.8)].into_iter().collect());
        let failed = SpecialistResult::Unavailable(Unavailable {
            attempts: 3,
            last: AttemptOutcome::TimedOut {
                after: Duration::from_secs(30),
            },
        });

        let report = merge([(&x[..], &ok), (&y[..], &failed)], 2);
        assert_eq!(report.get("x"), Some(0.8));
        assert_eq!(report.get("y"), Some(0.0));
        assert_eq!(report.get(NUMBER_OF_LEARNERS), Some(2.0));
        assert_eq!(report.len(), 3);
    }

    struct Stalled;

    #[async_trait]
    impl Specialist for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        fn fields(&self) -> &[MetricField] {
            &[]
        }

        async fn invoke(&self, _request: &AnalysisRequest) -> Result<Payload, SpecialistError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Payload::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_bound_counts_started_attempts() {
        let call = SpecialistCall::new(Arc::new(Stalled))
            .with_deadline(Duration::from_secs(1))
            .with_retry(RetryPolicy {
                max_attempts: 3,
                initial_delay_ms: 100,
                max_delay_ms: 500,
                backoff_multiplier: 2.0,
            });
        let recorder = Arc::new(ExecutionRecorder::new());

        // Attempt 1 times out at 1s, attempt 2 starts at 1.1s and is cut at 1.5s
        let (result, _) = run_bounded(
            &call,
            Arc::new(AnalysisRequest::default()),
            Arc::clone(&recorder),
            Duration::from_millis(1500),
        )
        .await;

        match result {
            SpecialistResult::Unavailable(u) => {
                assert_eq!(u.attempts, 2);
                assert!(matches!(u.last, AttemptOutcome::TimedOut { .. }));
            }
            other => panic!("expected unavailable, got {:?}", other),
        }

        let stats = recorder.specialist("stalled").unwrap();
        assert_eq!(stats.attempts_total, 2);
        assert_eq!(stats.failures, 2);
    }

    #[tokio::test]
    async fn test_empty_session_id_is_rejected() {
        let orchestrator =
            Orchestrator::new(vec![call("a", &["x"])], Arc::new(ExecutionRecorder::new())).unwrap();
        let mut sessions = SessionStore::new();

        let err = orchestrator
            .run(&mut sessions, " ", AnalysisRequest::default(), &RunMeta::default())
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::EmptySessionId);
        assert!(sessions.is_empty());
    }
}

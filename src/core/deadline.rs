//! Deadline guard for a single specialist attempt.
//!
//! The operation runs as its own task and is raced against a timer. If the
//! timer wins, the task is detached rather than aborted: it may still run
//! to completion in the background, but its result is discarded.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::domain::{AttemptOutcome, Payload, SpecialistError};

/// Race `operation` against `deadline`
pub async fn guard<F>(operation: F, deadline: Duration) -> AttemptOutcome
where
    F: Future<Output = Result<Payload, SpecialistError>> + Send + 'static,
{
    let mut handle = tokio::spawn(operation);

    tokio::select! {
        biased;

        joined = &mut handle => match joined {
            Ok(Ok(payload)) => AttemptOutcome::Success(payload),
            Ok(Err(e)) => AttemptOutcome::Failed(e),
            Err(e) if e.is_panic() => {
                AttemptOutcome::Failed(SpecialistError::Panicked(e.to_string()))
            }
            Err(e) => AttemptOutcome::Failed(SpecialistError::Other(format!(
                "attempt cancelled: {}",
                e
            ))),
        },

        _ = tokio::time::sleep(deadline) => {
            debug!(deadline_ms = deadline.as_millis() as u64, "Attempt exceeded deadline, detaching");
            // Dropping the JoinHandle detaches the task
            AttemptOutcome::TimedOut { after: deadline }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn payload(field: &str, value: f64) -> Payload {
        [(field.to_string(), value)].into_iter().collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_operation_wins() {
        let outcome = guard(
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(payload("x", 0.5))
            },
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(outcome, AttemptOutcome::Success(payload("x", 0.5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_is_failed() {
        let outcome = guard(
            async { Err(SpecialistError::InvalidPayload("missing x".into())) },
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(
            outcome,
            AttemptOutcome::Failed(SpecialistError::InvalidPayload(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_times_out_and_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let outcome = guard(
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(payload("x", 1.0))
            },
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(
            outcome,
            AttemptOutcome::TimedOut {
                after: Duration::from_secs(1)
            }
        );
        assert!(!finished.load(Ordering::SeqCst));

        // The detached task still completes on its own
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_becomes_failed() {
        let outcome = guard(
            async {
                let explode = true;
                if explode {
                    panic!("specialist exploded");
                }
                Ok(Payload::new())
            },
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(
            outcome,
            AttemptOutcome::Failed(SpecialistError::Panicked(_))
        ));
    }
}

//! Process-wide execution recorder.
//!
//! Counts attempts, successes, failures and durations per specialist, plus
//! analysis requests per source and errors per kind. One recorder is shared
//! (behind an `Arc`) by every orchestrator run in the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of attempt latencies kept for the rolling average
const LATENCY_WINDOW: usize = 100;

/// Fixed ring of recent latencies, written without locks
#[derive(Debug)]
struct LatencyWindow {
    slots: [AtomicU64; LATENCY_WINDOW],
    /// Total samples ever written; the next slot is `written % LATENCY_WINDOW`
    written: AtomicU64,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU64::new(0)),
            written: AtomicU64::new(0),
        }
    }
}

impl LatencyWindow {
    fn push(&self, duration_ms: u64) {
        let index = self.written.fetch_add(1, Ordering::Relaxed) as usize % LATENCY_WINDOW;
        self.slots[index].store(duration_ms, Ordering::Relaxed);
    }

    fn average(&self) -> u64 {
        let filled = self.written.load(Ordering::Relaxed).min(LATENCY_WINDOW as u64) as usize;
        let total: u64 = self.slots[..filled]
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .sum();
        average(total, filled as u64)
    }

    fn clear(&self) {
        self.written.store(0, Ordering::Relaxed);
        for slot in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    attempts_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl Counters {
    fn add(&self, success: bool, duration_ms: u64) {
        self.attempts_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.total_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    fn stats(&self) -> SpecialistStats {
        let attempts_total = self.attempts_total.load(Ordering::Relaxed);
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);
        SpecialistStats {
            attempts_total,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            total_duration_ms,
            average_duration_ms: average(total_duration_ms, attempts_total),
        }
    }
}

/// Cumulative counters for one specialist
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpecialistStats {
    pub attempts_total: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
}

/// Totals across all specialists
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Counters for analysis requests from one source
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestStats {
    pub count: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
}

/// Error tallies by kind
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStats {
    pub total: u64,
    pub by_kind: BTreeMap<String, u64>,
}

/// Point-in-time view of the recorder
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub per_specialist: BTreeMap<String, SpecialistStats>,
    pub totals: Totals,
    /// Successful attempts / all attempts, as a percentage with two decimals
    pub success_rate_percent: f64,
    /// Mean over the last 100 attempts
    pub average_attempt_latency_ms: u64,
    pub requests: BTreeMap<String, RequestStats>,
    pub errors: ErrorStats,
    pub generated_at: DateTime<Utc>,
}

/// Shared execution recorder
#[derive(Debug, Default)]
pub struct ExecutionRecorder {
    specialists: RwLock<HashMap<String, Arc<Counters>>>,
    recent_latencies: LatencyWindow,
    requests: Mutex<HashMap<String, RequestStats>>,
    errors: Mutex<ErrorStats>,
}

impl ExecutionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one specialist attempt
    pub fn record(&self, specialist: &str, success: bool, duration: Duration) {
        let duration_ms = duration.as_millis() as u64;
        self.counters_for(specialist).add(success, duration_ms);
        self.recent_latencies.push(duration_ms);
    }

    /// Record one analysis request from `source` (e.g. "json", "csv")
    pub fn record_request(&self, source: &str, success: bool, duration: Duration) {
        let duration_ms = duration.as_millis() as u64;
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let stats = requests.entry(source.to_string()).or_default();
        stats.count += 1;
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.total_duration_ms += duration_ms;
        stats.average_duration_ms = average(stats.total_duration_ms, stats.count);
    }

    /// Record an error by kind (e.g. "validation_error")
    pub fn record_error(&self, kind: &str) {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        errors.total += 1;
        *errors.by_kind.entry(kind.to_string()).or_default() += 1;
    }

    /// Counters for a single specialist, if it has been seen
    pub fn specialist(&self, name: &str) -> Option<SpecialistStats> {
        let map = self.specialists.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name).map(|c| c.stats())
    }

    /// Compute a snapshot from the current counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let per_specialist: BTreeMap<String, SpecialistStats> = {
            let map = self.specialists.read().unwrap_or_else(PoisonError::into_inner);
            map.iter().map(|(name, c)| (name.clone(), c.stats())).collect()
        };

        let totals = per_specialist.values().fold(Totals::default(), |mut t, s| {
            t.attempts += s.attempts_total;
            t.successes += s.successes;
            t.failures += s.failures;
            t
        });

        let success_rate_percent = if totals.attempts > 0 {
            let raw = totals.successes as f64 / totals.attempts as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        } else {
            0.0
        };

        let average_attempt_latency_ms = self.recent_latencies.average();

        let requests = self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let errors = self
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        MetricsSnapshot {
            per_specialist,
            totals,
            success_rate_percent,
            average_attempt_latency_ms,
            requests,
            errors,
            generated_at: Utc::now(),
        }
    }

    /// Administrative reset of every counter
    pub fn reset(&self) {
        self.specialists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.recent_latencies.clear();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.errors.lock().unwrap_or_else(PoisonError::into_inner) = ErrorStats::default();
    }

    fn counters_for(&self, name: &str) -> Arc<Counters> {
        {
            let map = self.specialists.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(c) = map.get(name) {
                return Arc::clone(c);
            }
        }

        let mut map = self.specialists.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(name.to_string()).or_default())
    }
}

fn average(total: u64, count: u64) -> u64 {
    if count == 0 {
        0
    } else {
        (total as f64 / count as f64).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates_per_specialist() {
        let recorder = ExecutionRecorder::new();
        recorder.record("rating", false, Duration::from_millis(100));
        recorder.record("rating", false, Duration::from_millis(100));
        recorder.record("rating", true, Duration::from_millis(400));

        let stats = recorder.specialist("rating").unwrap();
        assert_eq!(stats.attempts_total, 3);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.total_duration_ms, 600);
        assert_eq!(stats.average_duration_ms, 200);
    }

    #[test]
    fn test_snapshot_success_rate() {
        let recorder = ExecutionRecorder::new();
        recorder.record("a", true, Duration::from_millis(10));
        recorder.record("b", true, Duration::from_millis(10));
        recorder.record("b", false, Duration::from_millis(10));

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.totals.attempts, 3);
        assert_eq!(snapshot.totals.successes, 2);
        assert_eq!(snapshot.success_rate_percent, 66.67);
        assert_eq!(snapshot.average_attempt_latency_ms, 10);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ExecutionRecorder::new().snapshot();
        assert!(snapshot.per_specialist.is_empty());
        assert_eq!(snapshot.success_rate_percent, 0.0);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let recorder = ExecutionRecorder::new();
        for _ in 0..LATENCY_WINDOW {
            recorder.record("a", true, Duration::from_millis(1000));
        }
        for _ in 0..LATENCY_WINDOW {
            recorder.record("a", true, Duration::from_millis(10));
        }
        assert_eq!(recorder.snapshot().average_attempt_latency_ms, 10);
    }

    #[test]
    fn test_requests_errors_and_reset() {
        let recorder = ExecutionRecorder::new();
        recorder.record("a", true, Duration::from_millis(5));
        recorder.record_request("csv", true, Duration::from_millis(20));
        recorder.record_request("csv", false, Duration::from_millis(40));
        recorder.record_error("validation_error");

        let snapshot = recorder.snapshot();
        let csv = &snapshot.requests["csv"];
        assert_eq!(csv.count, 2);
        assert_eq!(csv.failures, 1);
        assert_eq!(csv.average_duration_ms, 30);
        assert_eq!(snapshot.errors.by_kind["validation_error"], 1);

        recorder.reset();
        let snapshot = recorder.snapshot();
        assert!(snapshot.per_specialist.is_empty());
        assert!(snapshot.requests.is_empty());
        assert_eq!(snapshot.errors.total, 0);
    }

    #[test]
    fn test_partial_latency_window_and_reset() {
        let recorder = ExecutionRecorder::new();
        for ms in [10, 20, 30] {
            recorder.record("a", true, Duration::from_millis(ms));
        }
        // Unwritten slots do not drag the average down
        assert_eq!(recorder.snapshot().average_attempt_latency_ms, 20);

        recorder.reset();
        assert_eq!(recorder.snapshot().average_attempt_latency_ms, 0);
        recorder.record("a", true, Duration::from_millis(40));
        assert_eq!(recorder.snapshot().average_attempt_latency_ms, 40);
    }

    #[test]
    fn test_snapshot_alongside_concurrent_records() {
        let recorder = Arc::new(ExecutionRecorder::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let recorder = Arc::clone(&recorder);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        recorder.record("shared", true, Duration::from_millis(7));
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            let snapshot = recorder.snapshot();
            assert!(snapshot.average_attempt_latency_ms <= 7);
        }
        for w in writers {
            w.join().unwrap();
        }

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.totals.attempts, 2000);
        assert_eq!(snapshot.average_attempt_latency_ms, 7);
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let recorder = Arc::new(ExecutionRecorder::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let recorder = Arc::clone(&recorder);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        recorder.record("shared", true, Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(recorder.specialist("shared").unwrap().attempts_total, 8000);
    }
}

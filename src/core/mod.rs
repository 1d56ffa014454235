//! Core orchestration logic.
//!
//! This module contains:
//! - Deadline: Per-attempt deadline guard
//! - Retry: Retry policy with exponential backoff
//! - Recorder: Process-wide execution counters
//! - Session: Per-request session contexts
//! - ReportStore: Append-only report persistence
//! - Orchestrator: Concurrent specialist fan-out and merge

pub mod deadline;
pub mod orchestrator;
pub mod recorder;
pub mod report_store;
pub mod retry;
pub mod session;

// Re-export commonly used types
pub use deadline::guard;
pub use orchestrator::{merge, Orchestrator, OrchestratorError, RunOutcome, SpecialistReport};
pub use recorder::{ExecutionRecorder, MetricsSnapshot, SpecialistStats};
pub use report_store::ReportStore;
pub use retry::RetryPolicy;
pub use session::{RunMeta, SessionContext, SessionStore};

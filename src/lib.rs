//! cohortlens - Resilient learner-analytics orchestrator
//!
//! Fans a learner-response dataset out to a roster of independent
//! analysis specialists, bounds every call with a deadline and a retry
//! policy, and merges whatever comes back into one flat report. A slow
//! or failing specialist degrades to default values for its own fields
//! and never blocks or fails the run.
//!
//! # Modules
//!
//! - `core`: Orchestration logic (Deadline, Retry, Recorder, Sessions, Orchestrator)
//! - `domain`: Data structures (LearnerRecord, AttemptOutcome, MergedReport)
//! - `specialists`: The specialist trait, built-in roster and HTTP specialists
//! - `ingest`: JSON and CSV input parsing
//! - `config`: Configuration discovery and resolution
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Analyze a JSON document from stdin
//! cat responses.json | cohortlens analyze --module intro-101
//!
//! # Analyze a CSV export, comparing against the last 5 stored runs
//! cohortlens csv data/spring.csv --module intro-101 --history 5 --metrics
//!
//! # Browse stored reports
//! cohortlens reports --module intro-101
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod specialists;

// Re-export main types at crate root for convenience
pub use core::{ExecutionRecorder, Orchestrator, ReportStore, RunMeta, SessionStore};
pub use domain::{AnalysisReport, AnalysisRequest, LearnerRecord, MergedReport, ResponseItem};
pub use specialists::{Specialist, SpecialistCall};

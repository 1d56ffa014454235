//! Domain types for cohortlens.
//!
//! This module contains the core data structures:
//! - Learner: Request records and validation
//! - Outcome: Attempt and terminal specialist outcomes
//! - Report: Merged reports and the caller-facing envelope

pub mod learner;
pub mod outcome;
pub mod report;

// Re-export commonly used types
pub use learner::{AnalysisRequest, LearnerRecord, ResponseItem, ValidationError};
pub use outcome::{
    classify, AttemptOutcome, ErrorKind, Payload, SpecialistError, SpecialistResult, Unavailable,
};
pub use report::{AnalysisReport, MergedReport, ReportSource, NUMBER_OF_LEARNERS};

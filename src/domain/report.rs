//! Merged metric reports and the envelope returned to callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Locally computed field: number of learner records in the request
pub const NUMBER_OF_LEARNERS: &str = "numberOfLearners";

/// Fixed-shape metric report
///
/// Holds every declared field, whether computed or defaulted. Keys are
/// kept sorted so serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedReport {
    metrics: BTreeMap<String, f64>,
}

impl MergedReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: f64) {
        self.metrics.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.metrics.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Field names in sorted order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, f64)> for MergedReport {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            metrics: iter.into_iter().collect(),
        }
    }
}

/// Where the learner records came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    Json,
    Csv,
}

impl ReportSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// A merged report plus the context it was produced in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub session_id: String,
    pub module_id: String,
    pub cohort: String,
    pub analyzed_at: DateTime<Utc>,
    pub source: ReportSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_file_path: Option<String>,

    pub metrics: MergedReport,

    /// Specialists whose fields were defaulted in this run
    #[serde(default)]
    pub unavailable: Vec<String>,
}

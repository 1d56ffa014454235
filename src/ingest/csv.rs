//! CSV ingestion of learner responses.
//!
//! One row per response item, grouped by learner id. Column names are
//! matched against the common spellings exported by LMS tools.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::domain::{LearnerRecord, ResponseItem};

const LEARNER_ID: &[&str] = &["learner_id", "learnerId", "Learner ID"];
const QUESTION_ID: &[&str] = &["question_id", "questionId", "Question ID"];
const ANSWER: &[&str] = &["answer", "Answer"];
const CORRECT: &[&str] = &["correct", "Correct"];
const COMPLETED: &[&str] = &["completed", "Completed"];
const RATING: &[&str] = &["rating", "Rating"];
const TIMESTAMP: &[&str] = &["timestamp", "Timestamp", "created_at", "createdAt"];

/// Column index lookup by any accepted spelling
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &csv::StringRecord) -> Self {
        Self {
            index: headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.to_string(), i))
                .collect(),
        }
    }

    /// First non-empty value among the accepted column names
    fn get<'r>(&self, record: &'r csv::StringRecord, names: &[&str]) -> Option<&'r str> {
        names
            .iter()
            .filter_map(|n| self.index.get(*n))
            .filter_map(|i| record.get(*i))
            .find(|v| !v.is_empty())
    }
}

/// Parse common boolean spellings (true/1/yes/y, case-insensitive)
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

/// Parse CSV content into learner records, in first-seen learner order
pub fn parse_learner_csv(content: &str) -> Result<Vec<LearnerRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let columns = Columns::new(reader.headers().context("Failed to read CSV header")?);

    let mut learners: Vec<LearnerRecord> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut rows = 0usize;

    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse CSV row {}", line + 1))?;
        rows += 1;

        let Some(learner_id) = columns.get(&record, LEARNER_ID) else {
            warn!(row = line + 1, "Skipping record with missing learner_id");
            continue;
        };

        let item = ResponseItem {
            question_id: columns.get(&record, QUESTION_ID).map(String::from),
            answer: columns
                .get(&record, ANSWER)
                .map(|a| serde_json::Value::String(a.to_string())),
            correct: columns.get(&record, CORRECT).map(parse_bool),
            completed: columns.get(&record, COMPLETED).map(parse_bool),
            rating: columns.get(&record, RATING).and_then(|r| r.parse::<f64>().ok()),
            timestamp: columns.get(&record, TIMESTAMP).map(String::from),
        };

        let position = *positions.entry(learner_id.to_string()).or_insert_with(|| {
            learners.push(LearnerRecord::new(learner_id));
            learners.len() - 1
        });
        learners[position].responses.push(item);
    }

    info!(rows, learners = learners.len(), "Parsed learner CSV");
    Ok(learners)
}

/// Read and parse a CSV file
pub async fn read_learner_csv(path: &Path) -> Result<Vec<LearnerRecord>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;

    parse_learner_csv(&content).with_context(|| format!("Failed to parse CSV file: {}", path.display()))
}

/// List `*.csv` files in `dir`, creating the directory if it is missing
pub async fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        info!(path = %dir.display(), "Created data directory");
    }

    let pattern = dir.join("*.csv");
    let pattern = pattern.to_string_lossy();

    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid glob pattern: {}", pattern))?
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();

    Ok(files)
}

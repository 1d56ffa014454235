//! Input ingestion: learner records from JSON or CSV.

pub mod csv;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::LearnerRecord;

pub use self::csv::{list_csv_files, parse_learner_csv, read_learner_csv};

/// Learner records plus any labels carried in the input document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonInput {
    pub learners: Vec<LearnerRecord>,
    pub module_id: Option<String>,
    pub cohort: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    Bare(Vec<LearnerRecord>),
    #[serde(rename_all = "camelCase")]
    Wrapped {
        learner_responses: Vec<LearnerRecord>,
        #[serde(default)]
        module_id: Option<String>,
        #[serde(default)]
        cohort: Option<String>,
    },
}

/// Parse either a bare array of learner records or a
/// `{ "learnerResponses": [...], "moduleId", "cohort" }` document
pub fn parse_learner_json(content: &str) -> Result<JsonInput> {
    let document: JsonDocument =
        serde_json::from_str(content).context("Failed to parse learner JSON")?;

    Ok(match document {
        JsonDocument::Bare(learners) => JsonInput {
            learners,
            ..Default::default()
        },
        JsonDocument::Wrapped {
            learner_responses,
            module_id,
            cohort,
        } => JsonInput {
            learners: learner_responses,
            module_id,
            cohort,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_array() {
        let input = parse_learner_json(r#"[{"learner_id": "a", "responses": []}]"#).unwrap();
        assert_eq!(input.learners.len(), 1);
        assert!(input.module_id.is_none());
    }

    #[test]
    fn test_wrapped_document() {
        let json = r#"{
            "learnerResponses": [{"learner_id": "a", "responses": [{"rating": 4}]}],
            "moduleId": "intro-101",
            "cohort": "spring"
        }"#;
        let input = parse_learner_json(json).unwrap();
        assert_eq!(input.module_id.as_deref(), Some("intro-101"));
        assert_eq!(input.cohort.as_deref(), Some("spring"));
        assert_eq!(input.learners[0].responses[0].rating, Some(4.0));
    }

    #[test]
    fn test_invalid_json() {
        assert!(parse_learner_json(r#"{"nope": 1}"#).is_err());
    }
}

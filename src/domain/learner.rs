//! Learner response records and request validation.
//!
//! An analysis request is a collection of learners, each carrying the
//! response items they produced while working through a module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inclusive bounds for a rating value
pub const RATING_MIN: f64 = 1.0;
pub const RATING_MAX: f64 = 5.0;

/// A single response item produced by one learner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseItem {
    /// Question identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,

    /// Raw answer (any JSON value)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<serde_json::Value>,

    /// Whether the answer was correct
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,

    /// Whether the learner completed the module with this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,

    /// Rating in [1, 5]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    /// ISO 8601 timestamp string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ResponseItem {
    /// True if the item carries any interaction signal at all
    pub fn has_interaction(&self) -> bool {
        self.answer.is_some()
            || self.correct.is_some()
            || self.completed.is_some()
            || self.rating.is_some()
    }
}

/// All responses for one learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerRecord {
    pub learner_id: String,

    #[serde(default)]
    pub responses: Vec<ResponseItem>,
}

impl LearnerRecord {
    pub fn new(learner_id: impl Into<String>) -> Self {
        Self {
            learner_id: learner_id.into(),
            responses: Vec::new(),
        }
    }

    pub fn with_response(mut self, item: ResponseItem) -> Self {
        self.responses.push(item);
        self
    }

    /// True if any item marks the learner as completed
    pub fn completed(&self) -> bool {
        self.responses.iter().any(|r| r.completed == Some(true))
    }

    /// Mean correctness over items with a correctness flag
    pub fn correctness(&self) -> Option<f64> {
        let flagged: Vec<bool> = self.responses.iter().filter_map(|r| r.correct).collect();
        if flagged.is_empty() {
            return None;
        }
        let correct = flagged.iter().filter(|c| **c).count();
        Some(correct as f64 / flagged.len() as f64)
    }

    /// Mean rating over rated items
    pub fn mean_rating(&self) -> Option<f64> {
        let ratings: Vec<f64> = self.responses.iter().filter_map(|r| r.rating).collect();
        if ratings.is_empty() {
            return None;
        }
        Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
    }
}

/// The input handed to every specialist in one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub learners: Vec<LearnerRecord>,
}

impl AnalysisRequest {
    pub fn new(learners: Vec<LearnerRecord>) -> Self {
        Self { learners }
    }

    pub fn learner_count(&self) -> usize {
        self.learners.len()
    }

    /// Iterate over every response item of every learner
    pub fn items(&self) -> impl Iterator<Item = &ResponseItem> {
        self.learners.iter().flat_map(|l| l.responses.iter())
    }

    /// Validate the request structure before it reaches the orchestrator
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.learners.is_empty() {
            return Err(ValidationError::NoLearners);
        }

        for (index, learner) in self.learners.iter().enumerate() {
            if learner.learner_id.trim().is_empty() {
                return Err(ValidationError::MissingLearnerId { index });
            }

            for item in &learner.responses {
                if let Some(rating) = item.rating {
                    if !(RATING_MIN..=RATING_MAX).contains(&rating) {
                        return Err(ValidationError::RatingOutOfRange {
                            learner_id: learner.learner_id.clone(),
                            rating,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

/// Validate an optional label such as a module id or cohort
pub fn validate_label(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(ValidationError::EmptyLabel { field }),
        _ => Ok(()),
    }
}

/// Request validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("at least one learner record is required")]
    NoLearners,

    #[error("learner at index {index} has an empty learner_id")]
    MissingLearnerId { index: usize },

    #[error("learner '{learner_id}' has rating {rating} outside [1, 5]")]
    RatingOutOfRange { learner_id: String, rating: f64 },

    #[error("{field} must not be empty when provided")]
    EmptyLabel { field: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(correct: Option<bool>, completed: Option<bool>, rating: Option<f64>) -> ResponseItem {
        ResponseItem {
            correct,
            completed,
            rating,
            ..Default::default()
        }
    }

    #[test]
    fn test_learner_aggregates() {
        let learner = LearnerRecord::new("l1")
            .with_response(item(Some(true), None, Some(4.0)))
            .with_response(item(Some(false), Some(true), Some(2.0)))
            .with_response(item(None, None, None));

        assert!(learner.completed());
        assert_eq!(learner.correctness(), Some(0.5));
        assert_eq!(learner.mean_rating(), Some(3.0));
    }

    #[test]
    fn test_validation_rejects_empty_request() {
        let request = AnalysisRequest::default();
        assert_eq!(request.validate(), Err(ValidationError::NoLearners));
    }

    #[test]
    fn test_validation_rejects_bad_rating() {
        let request = AnalysisRequest::new(vec![
            LearnerRecord::new("l1").with_response(item(None, None, Some(7.0)))
        ]);
        assert!(matches!(
            request.validate(),
            Err(ValidationError::RatingOutOfRange { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_blank_learner_id() {
        let request = AnalysisRequest::new(vec![LearnerRecord::new("  ")]);
        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingLearnerId { index: 0 })
        );
    }

    #[test]
    fn test_learner_record_deserializes_sparse_items() {
        let json = r#"{"learner_id": "a", "responses": [{"correct": true}, {}]}"#;
        let learner: LearnerRecord = serde_json::from_str(json).unwrap();
        assert_eq!(learner.responses.len(), 2);
        assert!(learner.responses[0].has_interaction());
        assert!(!learner.responses[1].has_interaction());
    }

    #[test]
    fn test_validate_label() {
        assert!(validate_label("moduleId", None).is_ok());
        assert!(validate_label("moduleId", Some("m1")).is_ok());
        assert!(validate_label("moduleId", Some("")).is_err());
    }
}

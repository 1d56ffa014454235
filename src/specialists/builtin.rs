//! Built-in specialists that score learner data locally.
//!
//! Each specialist owns the same fields as its remote counterpart would and
//! honors the same bounds, so a roster can mix built-in and HTTP entries.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{AnalysisRequest, Payload, SpecialistError};

use super::{MetricField, Specialist};

pub const ENGAGEMENT: &str = "engagement";
pub const COMPLETION: &str = "completion";
pub const MASTERY: &str = "mastery";
pub const RATING: &str = "rating";
pub const MARKET: &str = "market";

/// Names accepted for `type: builtin` roster entries, in roster order
pub const BUILTIN_NAMES: [&str; 5] = [ENGAGEMENT, COMPLETION, MASTERY, RATING, MARKET];

/// Correctness at or above this counts a learner as ready
const READINESS_THRESHOLD: f64 = 0.7;

/// Mean rating at or below this counts as an objection
const OBJECTION_RATING: f64 = 2.0;

/// Look up a built-in specialist by name
pub fn builtin_specialist(name: &str) -> Option<Arc<dyn Specialist>> {
    let specialist: Arc<dyn Specialist> = match name {
        ENGAGEMENT => Arc::new(EngagementSpecialist::new()),
        COMPLETION => Arc::new(CompletionSpecialist::new()),
        MASTERY => Arc::new(MasterySpecialist::new()),
        RATING => Arc::new(RatingSpecialist::new()),
        MARKET => Arc::new(MarketSpecialist::new()),
        _ => return None,
    };
    Some(specialist)
}

/// All five built-ins in roster order
pub fn builtin_roster() -> Vec<Arc<dyn Specialist>> {
    BUILTIN_NAMES
        .iter()
        .filter_map(|name| builtin_specialist(name))
        .collect()
}

fn require_learners(request: &AnalysisRequest) -> Result<(), SpecialistError> {
    if request.learners.is_empty() {
        return Err(SpecialistError::InvalidInput("no learner records".into()));
    }
    Ok(())
}

fn completion_rate(request: &AnalysisRequest) -> f64 {
    let completed = request.learners.iter().filter(|l| l.completed()).count();
    completed as f64 / request.learners.len() as f64
}

/// Correct items / items carrying a correctness flag
fn objective_score(request: &AnalysisRequest) -> Option<f64> {
    let flagged: Vec<bool> = request.items().filter_map(|i| i.correct).collect();
    if flagged.is_empty() {
        return None;
    }
    Some(flagged.iter().filter(|c| **c).count() as f64 / flagged.len() as f64)
}

fn payload<const N: usize>(entries: [(&str, f64); N]) -> Payload {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Share of response items carrying any interaction signal
pub struct EngagementSpecialist {
    fields: Vec<MetricField>,
}

impl EngagementSpecialist {
    pub fn new() -> Self {
        Self {
            fields: vec![MetricField::unit("engagementRate")],
        }
    }
}

impl Default for EngagementSpecialist {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Specialist for EngagementSpecialist {
    fn name(&self) -> &str {
        ENGAGEMENT
    }

    fn fields(&self) -> &[MetricField] {
        &self.fields
    }

    async fn invoke(&self, request: &AnalysisRequest) -> Result<Payload, SpecialistError> {
        require_learners(request)?;

        let total = request.items().count();
        let engaged = request.items().filter(|i| i.has_interaction()).count();
        let rate = if total == 0 {
            0.0
        } else {
            engaged as f64 / total as f64
        };

        Ok(payload([("engagementRate", rate)]))
    }
}

/// Learners with a completed item / all learners
pub struct CompletionSpecialist {
    fields: Vec<MetricField>,
}

impl CompletionSpecialist {
    pub fn new() -> Self {
        Self {
            fields: vec![MetricField::unit("completionRate")],
        }
    }
}

impl Default for CompletionSpecialist {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Specialist for CompletionSpecialist {
    fn name(&self) -> &str {
        COMPLETION
    }

    fn fields(&self) -> &[MetricField] {
        &self.fields
    }

    async fn invoke(&self, request: &AnalysisRequest) -> Result<Payload, SpecialistError> {
        require_learners(request)?;
        Ok(payload([("completionRate", completion_rate(request))]))
    }
}

/// Objective score and strength-to-completion
pub struct MasterySpecialist {
    fields: Vec<MetricField>,
}

impl MasterySpecialist {
    pub fn new() -> Self {
        Self {
            fields: vec![MetricField::unit("objectiveScore"), MetricField::unit("STR")],
        }
    }
}

impl Default for MasterySpecialist {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Specialist for MasterySpecialist {
    fn name(&self) -> &str {
        MASTERY
    }

    fn fields(&self) -> &[MetricField] {
        &self.fields
    }

    async fn invoke(&self, request: &AnalysisRequest) -> Result<Payload, SpecialistError> {
        require_learners(request)?;

        let objective = objective_score(request).ok_or_else(|| {
            SpecialistError::InvalidInput("no responses carry a correctness flag".into())
        })?;

        // Half correctness, half completion, per learner
        let str_total: f64 = request
            .learners
            .iter()
            .map(|l| {
                let completed = if l.completed() { 1.0 } else { 0.0 };
                0.5 * l.correctness().unwrap_or(0.0) + 0.5 * completed
            })
            .sum();
        let str_score = str_total / request.learners.len() as f64;

        Ok(payload([("objectiveScore", objective), ("STR", str_score)]))
    }
}

/// Mean rating across all rated items
pub struct RatingSpecialist {
    fields: Vec<MetricField>,
}

impl RatingSpecialist {
    pub fn new() -> Self {
        Self {
            fields: vec![MetricField::new("averageRating", 1.0, 5.0)],
        }
    }
}

impl Default for RatingSpecialist {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Specialist for RatingSpecialist {
    fn name(&self) -> &str {
        RATING
    }

    fn fields(&self) -> &[MetricField] {
        &self.fields
    }

    async fn invoke(&self, request: &AnalysisRequest) -> Result<Payload, SpecialistError> {
        require_learners(request)?;

        let ratings: Vec<f64> = request.items().filter_map(|i| i.rating).collect();
        if ratings.is_empty() {
            return Err(SpecialistError::InvalidInput("no ratings to average".into()));
        }
        let mean = ratings.iter().sum::<f64>() / ratings.len() as f64;

        Ok(payload([("averageRating", mean)]))
    }
}

/// Readiness, conversion stopping, objection demand and a blended index
pub struct MarketSpecialist {
    fields: Vec<MetricField>,
}

impl MarketSpecialist {
    pub fn new() -> Self {
        Self {
            fields: vec![
                MetricField::new("strPercent", 0.0, 100.0),
                MetricField::unit("csr"),
                MetricField::unit("cod"),
                MetricField::unit("insightIndex"),
            ],
        }
    }
}

impl Default for MarketSpecialist {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Specialist for MarketSpecialist {
    fn name(&self) -> &str {
        MARKET
    }

    fn fields(&self) -> &[MetricField] {
        &self.fields
    }

    async fn invoke(&self, request: &AnalysisRequest) -> Result<Payload, SpecialistError> {
        require_learners(request)?;
        let learners = request.learners.len() as f64;

        let ready = request
            .learners
            .iter()
            .filter(|l| l.correctness().is_some_and(|c| c >= READINESS_THRESHOLD))
            .count();
        let str_percent = ready as f64 / learners * 100.0;

        let stopped = request
            .learners
            .iter()
            .filter(|l| !l.completed() && l.responses.iter().any(|r| r.has_interaction()))
            .count();
        let csr = stopped as f64 / learners;

        let ratings: Vec<f64> = request.learners.iter().filter_map(|l| l.mean_rating()).collect();
        let cod = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().filter(|r| **r <= OBJECTION_RATING).count() as f64 / ratings.len() as f64
        };

        let insight_index = (completion_rate(request)
            + objective_score(request).unwrap_or(0.0)
            + (1.0 - csr)
            + (1.0 - cod))
            / 4.0;

        Ok(payload([
            ("strPercent", str_percent),
            ("csr", csr),
            ("cod", cod),
            ("insightIndex", insight_index),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LearnerRecord, ResponseItem};
    use crate::specialists::validate_payload;

    fn item(correct: Option<bool>, completed: Option<bool>, rating: Option<f64>) -> ResponseItem {
        ResponseItem {
            correct,
            completed,
            rating,
            ..Default::default()
        }
    }

    /// Two learners: one strong and finished, one weak and stopped early
    fn sample() -> AnalysisRequest {
        AnalysisRequest::new(vec![
            LearnerRecord::new("a")
                .with_response(item(Some(true), None, Some(5.0)))
                .with_response(item(Some(true), Some(true), None)),
            LearnerRecord::new("b")
                .with_response(item(Some(false), None, Some(1.0)))
                .with_response(item(None, None, None)),
        ])
    }

    #[tokio::test]
    async fn test_builtin_roster_order() {
        let names: Vec<String> = builtin_roster().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, BUILTIN_NAMES.map(String::from).to_vec());
        assert!(builtin_specialist("nope").is_none());
    }

    #[tokio::test]
    async fn test_engagement_and_completion() {
        let request = sample();

        let engagement = EngagementSpecialist::new().invoke(&request).await.unwrap();
        assert_eq!(engagement["engagementRate"], 0.75);

        let completion = CompletionSpecialist::new().invoke(&request).await.unwrap();
        assert_eq!(completion["completionRate"], 0.5);
    }

    #[tokio::test]
    async fn test_mastery() {
        let result = MasterySpecialist::new().invoke(&sample()).await.unwrap();
        assert!((result["objectiveScore"] - 2.0 / 3.0).abs() < 1e-9);
        // a: 0.5 * 1 + 0.5 * 1, b: 0.5 * 0 + 0
        assert_eq!(result["STR"], 0.5);
    }

    #[tokio::test]
    async fn test_rating_without_ratings_is_invalid_input() {
        let request = AnalysisRequest::new(vec![
            LearnerRecord::new("a").with_response(item(Some(true), None, None))
        ]);
        let err = RatingSpecialist::new().invoke(&request).await.unwrap_err();
        assert!(matches!(err, SpecialistError::InvalidInput(_)));

        let ok = RatingSpecialist::new().invoke(&sample()).await.unwrap();
        assert_eq!(ok["averageRating"], 3.0);
    }

    #[tokio::test]
    async fn test_market() {
        let result = MarketSpecialist::new().invoke(&sample()).await.unwrap();
        assert_eq!(result["strPercent"], 50.0);
        assert_eq!(result["csr"], 0.5);
        assert_eq!(result["cod"], 0.5);
    }

    #[tokio::test]
    async fn test_outputs_respect_declared_bounds() {
        let request = sample();
        for specialist in builtin_roster() {
            let payload = specialist.invoke(&request).await.unwrap();
            assert!(
                validate_payload(specialist.fields(), payload).is_ok(),
                "{} produced an out-of-bounds payload",
                specialist.name()
            );
        }
    }
}

//! Ingestion Integration Tests
//!
//! CSV and JSON inputs read from disk and validated as analysis requests.

use cohortlens::domain::{AnalysisRequest, ValidationError};
use cohortlens::ingest::{list_csv_files, parse_learner_json, read_learner_csv};
use tempfile::TempDir;

const EXPORT: &str = "\
learnerId,questionId,correct,completed,rating
l1,q1,true,yes,5
l2,q1,false,,2
l1,q2,true,,
";

#[tokio::test]
async fn test_read_csv_file_into_valid_request() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("spring.csv");
    std::fs::write(&path, EXPORT).unwrap();

    let learners = read_learner_csv(&path).await.unwrap();
    assert_eq!(learners.len(), 2);
    assert_eq!(learners[0].responses.len(), 2);

    let request = AnalysisRequest::new(learners);
    assert!(request.validate().is_ok());
    assert_eq!(request.items().count(), 3);
}

#[tokio::test]
async fn test_missing_csv_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    assert!(read_learner_csv(&temp.path().join("nope.csv")).await.is_err());
}

#[tokio::test]
async fn test_list_csv_files_sorted_and_filtered() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");

    // Missing directory is created
    assert!(list_csv_files(&data).await.unwrap().is_empty());
    assert!(data.is_dir());

    std::fs::write(data.join("b.csv"), EXPORT).unwrap();
    std::fs::write(data.join("a.csv"), EXPORT).unwrap();
    std::fs::write(data.join("notes.txt"), "ignore me").unwrap();

    let files = list_csv_files(&data).await.unwrap();
    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.csv", "b.csv"]);
}

#[test]
fn test_json_rating_out_of_range_fails_validation() {
    let input = parse_learner_json(
        r#"{"learnerResponses": [{"learner_id": "a", "responses": [{"rating": 9}]}]}"#,
    )
    .unwrap();

    let err = AnalysisRequest::new(input.learners).validate().unwrap_err();
    assert!(matches!(err, ValidationError::RatingOutOfRange { .. }));
}

#[test]
fn test_empty_json_array_fails_validation() {
    let input = parse_learner_json("[]").unwrap();
    assert_eq!(
        AnalysisRequest::new(input.learners).validate(),
        Err(ValidationError::NoLearners)
    );
}

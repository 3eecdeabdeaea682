//! Integration tests for dataset loading

use cotbench_infer::EvalDataset;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_loads_jsonl_by_name() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let jsonl = r#"{"question": "Janet has 5 apples. She gives 2 to Bob. How many does she have?", "answer": "3"}
{"question": "There are 10 birds. 3 fly away. How many remain?", "answer": 7}

{"question": "What is 2+2?", "answer": "4"}
"#;
    fs::write(dir.path().join("gsm8k.jsonl"), jsonl).expect("Failed to write dataset");

    let dataset = EvalDataset::load("gsm8k", dir.path()).expect("Failed to load dataset");
    assert_eq!(dataset.name(), "gsm8k");
    assert_eq!(dataset.len(), 3, "blank lines are skipped");

    let batches: Vec<_> = dataset.batches(2).collect();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].ground_truth_values, vec![3.0, 7.0]);
    assert_eq!(batches[1].ground_truth_values, vec![4.0]);
}

#[test]
fn test_missing_dataset_is_fatal() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    assert!(EvalDataset::load("ghost", dir.path()).is_err());
}

#[test]
fn test_sample_without_answer_is_fatal() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        dir.path().join("broken.jsonl"),
        r#"{"question": "no answer here"}"#,
    )
    .expect("Failed to write dataset");

    let err = EvalDataset::load("broken", dir.path()).unwrap_err();
    assert!(err.to_string().contains("answer"));
}

//! Integration tests for the append-only results writer

use cotbench_harness::{BatchRecord, OutputWriter};
use std::fs;
use tempfile::TempDir;

fn record(batch_idx: usize, batch_accuracy: f32, running_accuracy: f32) -> BatchRecord {
    BatchRecord {
        batch_idx,
        prompts: vec![format!("prompt {batch_idx}")],
        generated_texts: vec![format!("generation {batch_idx}")],
        ground_truth_values: vec![4.0],
        batch_accuracy,
        running_accuracy,
    }
}

#[test]
fn test_appends_one_line_per_batch() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("results.jsonl");

    let mut writer = OutputWriter::open(&path).expect("Failed to open writer");
    writer.append(&record(0, 1.0, 1.0)).expect("Failed to append");
    writer.append(&record(1, 0.0, 0.5)).expect("Failed to append");

    let contents = fs::read_to_string(&path).expect("Failed to read results");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: BatchRecord = serde_json::from_str(lines[0]).expect("line 0 should parse");
    let second: BatchRecord = serde_json::from_str(lines[1]).expect("line 1 should parse");
    assert_eq!(first.batch_idx, 0);
    assert_eq!(second.batch_idx, 1);
    assert_eq!(second.running_accuracy, 0.5);
}

#[test]
fn test_reopen_does_not_truncate() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("results.jsonl");

    {
        let mut writer = OutputWriter::open(&path).expect("Failed to open writer");
        writer.append(&record(0, 1.0, 1.0)).expect("Failed to append");
    }
    {
        let mut writer = OutputWriter::open(&path).expect("Failed to reopen writer");
        writer.append(&record(1, 0.5, 0.75)).expect("Failed to append");
    }

    let contents = fs::read_to_string(&path).expect("Failed to read results");
    assert_eq!(contents.lines().count(), 2, "prior records must survive reopen");
}

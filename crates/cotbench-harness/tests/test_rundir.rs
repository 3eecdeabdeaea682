//! Integration tests for run directory lifecycle

use cotbench_config::RunConfig;
use cotbench_harness::{create_run_directory, finalize_run};
use std::fs;
use tempfile::TempDir;

fn sample_config() -> RunConfig {
    RunConfig::from_yaml_str(
        r#"
model_name: tiny-policy
learning_rate: 1e-4
epochs: 1
batch_size: 2
run_note: kept-verbatim
"#,
    )
    .expect("Failed to parse sample config")
}

#[test]
fn test_config_snapshot_written() {
    let base = TempDir::new().expect("Failed to create temp dir");
    let config = sample_config();

    let run_dir = create_run_directory(base.path(), "tiny", Some(&config))
        .expect("Failed to create run directory");

    let snapshot = fs::read_to_string(run_dir.join("config.json"))
        .expect("config.json should exist in the run directory");
    assert!(snapshot.contains("\"model_name\": \"tiny-policy\""));
    assert!(snapshot.contains("\"run_note\": \"kept-verbatim\""));
}

#[test]
fn test_finalize_moves_run_directory() {
    let base = TempDir::new().expect("Failed to create temp dir");
    let run_dir = base.path().join("poli_04_12-30");
    fs::create_dir_all(&run_dir).expect("Failed to create run dir");
    fs::write(run_dir.join("results.jsonl"), "{}\n").expect("Failed to write results");

    let final_dir = base.path().join("poli_final");
    finalize_run(&run_dir, &final_dir).expect("Failed to finalize run");

    assert!(!run_dir.exists(), "run directory must be gone after finalize");
    assert!(final_dir.join("results.jsonl").is_file());
}

#[test]
fn test_finalize_replaces_existing_final_directory() {
    let base = TempDir::new().expect("Failed to create temp dir");
    let run_dir = base.path().join("poli_04_12-30");
    fs::create_dir_all(&run_dir).expect("Failed to create run dir");
    fs::write(run_dir.join("results.jsonl"), "new\n").expect("Failed to write results");

    let final_dir = base.path().join("poli_final");
    fs::create_dir_all(&final_dir).expect("Failed to create stale final dir");
    fs::write(final_dir.join("stale.txt"), "old").expect("Failed to write stale file");

    finalize_run(&run_dir, &final_dir).expect("Failed to finalize over existing dir");

    assert!(!run_dir.exists());
    assert!(final_dir.join("results.jsonl").is_file());
    assert!(
        !final_dir.join("stale.txt").exists(),
        "displaced final directory contents must not survive"
    );
    assert!(
        !final_dir.with_extension("old").exists(),
        "the displaced copy is cleaned up after promotion"
    );
}

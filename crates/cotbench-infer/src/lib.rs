//! Batched inference with accuracy scoring
//!
//! The loop in this crate is the heart of the harness: iterate prompt
//! batches, generate completions, pull a final numeric answer out of each
//! completion, compare against ground truth, fold the per-batch accuracy
//! into a running average, and persist one record per batch as it lands.

pub mod answer;
pub mod dataset;
pub mod run;

pub use answer::{batch_accuracy, extract_final_number};
pub use dataset::{EvalBatch, EvalDataset, EvalSample};
pub use run::{run_inference, InferenceSummary, RunningAccuracy};

//! The batched inference loop

use crate::answer::{batch_accuracy, extract_final_number};
use crate::dataset::EvalDataset;
use anyhow::Result;
use cotbench_harness::{BatchRecord, OutputWriter};
use cotbench_model::{GenerationParams, TextGenerator};

/// Online average of per-batch accuracies
///
/// Every batch carries equal weight regardless of its size:
/// `new = (old * i + batch_acc) / (i + 1)` after batch `i`. That matches
/// the documented behavior exactly and is kept as-is even though a short
/// final batch skews it relative to a per-sample mean.
#[derive(Debug, Clone, Default)]
pub struct RunningAccuracy {
    value: f32,
    batches: usize,
}

impl RunningAccuracy {
    /// Start at zero with no batches seen
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the next batch accuracy, returning the updated average
    pub fn update(&mut self, batch_acc: f32) -> f32 {
        self.value = (self.value * self.batches as f32 + batch_acc) / (self.batches as f32 + 1.0);
        self.batches += 1;
        self.value
    }

    /// Current running average
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Number of batches folded in
    pub fn batches(&self) -> usize {
        self.batches
    }
}

/// Terminal numbers reported after the last batch
///
/// Both averages are reported on purpose: they differ when batch sizes
/// are unequal, and seeing both is useful when eyeballing a run.
#[derive(Debug, Clone, Copy)]
pub struct InferenceSummary {
    /// Online equal-weight running average
    pub running_accuracy: f32,
    /// Plain arithmetic mean of the per-batch accuracies
    pub mean_accuracy: f32,
    /// Number of batches processed
    pub batches: usize,
}

/// Drive generation and scoring over every batch of the dataset
///
/// For each batch: generate, extract the final number from each
/// completion, score exact matches against ground truth, fold the batch
/// accuracy into the running average, and append one record to the
/// results file before moving on. Failures propagate immediately; there
/// is no retry and no buffering of writes.
///
/// # Arguments
/// * `generator` - Text generation seam (a bound model/tokenizer session)
/// * `dataset` - Evaluation dataset
/// * `params` - Decoding parameters
/// * `batch_size` - Prompts per batch
/// * `writer` - Append-only results writer
pub fn run_inference<G: TextGenerator>(
    generator: &G,
    dataset: &EvalDataset,
    params: &GenerationParams,
    batch_size: usize,
    writer: &mut OutputWriter,
) -> Result<InferenceSummary> {
    let mut running = RunningAccuracy::new();
    let mut accuracies: Vec<f32> = Vec::new();

    for (batch_idx, batch) in dataset.batches(batch_size).enumerate() {
        let generated_texts = generator.generate(&batch.prompts, params)?;

        let predictions: Vec<Option<f64>> = generated_texts
            .iter()
            .map(|text| extract_final_number(text))
            .collect();
        let batch_acc = batch_accuracy(&predictions, &batch.ground_truth_values);

        accuracies.push(batch_acc);
        let cumulative = running.update(batch_acc);
        println!("Cumulative Accuracy: {:.2}%", cumulative * 100.0);

        writer.append(&BatchRecord {
            batch_idx,
            prompts: batch.prompts,
            generated_texts,
            ground_truth_values: batch.ground_truth_values,
            batch_accuracy: batch_acc,
            running_accuracy: cumulative,
        })?;
    }

    let mean_accuracy = if accuracies.is_empty() {
        0.0
    } else {
        accuracies.iter().sum::<f32>() / accuracies.len() as f32
    };

    Ok(InferenceSummary {
        running_accuracy: running.value(),
        mean_accuracy,
        batches: accuracies.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_accuracy_sequence() {
        let mut running = RunningAccuracy::new();
        assert_eq!(running.update(1.0), 1.0);
        assert_eq!(running.update(0.0), 0.5);
        assert_eq!(running.update(0.5), 0.5);
        assert_eq!(running.batches(), 3);
    }

    #[test]
    fn test_running_accuracy_weighs_batches_equally() {
        // A small final batch moves the average as much as a full one
        let mut running = RunningAccuracy::new();
        running.update(1.0);
        running.update(0.0);
        assert_eq!(running.value(), 0.5);
    }
}

//! Evaluation dataset loading and batching

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One evaluation sample
#[derive(Debug, Clone)]
pub struct EvalSample {
    /// Prompt fed to the model
    pub question: String,
    /// Expected numeric answer
    pub answer: f64,
}

/// A group of aligned prompts and expected answers
#[derive(Debug, Clone)]
pub struct EvalBatch {
    /// Prompts in dataset order
    pub prompts: Vec<String>,
    /// Ground-truth answers, aligned with `prompts`
    pub ground_truth_values: Vec<f64>,
}

/// A named evaluation dataset
///
/// Datasets are JSONL files named `{dataset_name}.jsonl` under the data
/// directory, one `{"question": ..., "answer": ...}` object per line.
/// Answers may be numbers or numeric strings.
#[derive(Debug)]
pub struct EvalDataset {
    name: String,
    samples: Vec<EvalSample>,
}

impl EvalDataset {
    /// Load a dataset by name
    ///
    /// # Arguments
    /// * `name` - Dataset name, resolved as `{data_dir}/{name}.jsonl`
    /// * `data_dir` - Directory holding dataset files
    pub fn load(name: &str, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(format!("{name}.jsonl"));
        let file = File::open(&path)
            .with_context(|| format!("Failed to open dataset file: {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut samples = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let json: serde_json::Value = serde_json::from_str(&line)
                .with_context(|| format!("Invalid JSON on line {} of {}", line_no + 1, path.display()))?;

            let question = json
                .get("question")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("Missing 'question' field on line {}", line_no + 1))?
                .to_string();

            let answer = json
                .get("answer")
                .and_then(parse_answer)
                .ok_or_else(|| anyhow::anyhow!("Missing numeric 'answer' field on line {}", line_no + 1))?;

            samples.push(EvalSample { question, answer });
        }

        tracing::info!(name, samples = samples.len(), "loaded evaluation dataset");
        Ok(Self {
            name: name.to_string(),
            samples,
        })
    }

    /// Build a dataset from in-memory samples
    pub fn from_samples(name: &str, samples: Vec<EvalSample>) -> Self {
        Self {
            name: name.to_string(),
            samples,
        }
    }

    /// Dataset name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterate batches in dataset order; the last batch may be short
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = EvalBatch> + '_ {
        let batch_size = batch_size.max(1);
        self.samples.chunks(batch_size).map(|chunk| EvalBatch {
            prompts: chunk.iter().map(|s| s.question.clone()).collect(),
            ground_truth_values: chunk.iter().map(|s| s.answer).collect(),
        })
    }
}

fn parse_answer(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

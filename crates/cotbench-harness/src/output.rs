//! Append-only per-batch results file

use crate::HarnessError;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One line of the results file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Zero-based batch index
    pub batch_idx: usize,
    /// Prompts fed to the model this batch
    pub prompts: Vec<String>,
    /// Decoded generations, aligned with `prompts`
    pub generated_texts: Vec<String>,
    /// Expected answers, aligned with `prompts`
    pub ground_truth_values: Vec<f64>,
    /// Fraction of exact matches in this batch
    pub batch_accuracy: f32,
    /// Cumulative running accuracy after this batch
    pub running_accuracy: f32,
}

/// Writer that appends one JSON line per batch
///
/// Records are flushed as they are written; an interrupted run keeps every
/// batch that completed. The file is never truncated, so re-running against
/// the same path extends it.
pub struct OutputWriter {
    path: PathBuf,
    file: std::fs::File,
}

impl OutputWriter {
    /// Open (or create) the results file in append mode
    pub fn open(path: &Path) -> Result<Self, HarnessError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| HarnessError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append one batch record
    pub fn append(&mut self, record: &BatchRecord) -> Result<(), HarnessError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .map_err(|e| HarnessError::io(&self.path, e))?;
        self.file.flush().map_err(|e| HarnessError::io(&self.path, e))?;
        Ok(())
    }

    /// Path of the results file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

//! Run bookkeeping for cotbench
//!
//! This crate owns the pieces of a run that touch the process environment
//! and the filesystem but not the model: timestamped run directories and
//! their end-of-run promotion, the append-only per-batch results file, and
//! the distributed-launcher bootstrap.

pub mod distributed;
pub mod output;
pub mod rundir;

pub use distributed::{init_distributed, DistributedContext};
pub use output::{BatchRecord, OutputWriter};
pub use rundir::{create_run_directory, finalize_run, final_run_directory};

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by run bookkeeping
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Filesystem operation failed
    #[error("filesystem operation failed on {}", .path.display())]
    Io {
        /// Path the operation targeted
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// A record or snapshot could not be serialized
    #[error("failed to serialize record")]
    Serialize(#[from] serde_json::Error),
    /// The distributed launcher environment was inconsistent
    #[error("distributed init failed: {0}")]
    DistributedInit(String),
}

impl HarnessError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            source,
        }
    }
}

//! Timestamped run directories and end-of-run promotion

use crate::HarnessError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Create a unique directory for this run's outputs
///
/// The directory is named `{model_name}_{timestamp}` with day/hour/minute
/// granularity. Two runs starting within the same minute with the same
/// model-name prefix share a directory; creation is idempotent and must
/// not fail in that case. If a config is supplied it is snapshotted as
/// pretty-printed `config.json` inside the new directory.
///
/// # Arguments
/// * `base_dir` - Root directory for runs, created if absent
/// * `model_name` - Prefix identifying the run
/// * `config` - Optional config to snapshot alongside the run
///
/// # Returns
/// Path to the run directory
pub fn create_run_directory<C: Serialize>(
    base_dir: &Path,
    model_name: &str,
    config: Option<&C>,
) -> Result<PathBuf, HarnessError> {
    fs::create_dir_all(base_dir).map_err(|e| HarnessError::io(base_dir, e))?;

    let timestamp = chrono::Local::now().format("%d_%H-%M");
    let run_name = format!("{model_name}_{timestamp}");
    let run_dir = base_dir.join(run_name);
    fs::create_dir_all(&run_dir).map_err(|e| HarnessError::io(&run_dir, e))?;

    if let Some(config) = config {
        let snapshot = serde_json::to_string_pretty(config)?;
        let config_path = run_dir.join("config.json");
        fs::write(&config_path, snapshot).map_err(|e| HarnessError::io(&config_path, e))?;
    }

    tracing::info!(run_dir = %run_dir.display(), "created run directory");
    Ok(run_dir)
}

/// Resolve the directory a finished run is promoted to
///
/// When the run evaluated a loaded checkpoint, the final name is derived
/// from the checkpoint's file stem (`{stem}_eval`); otherwise the run
/// keeps its own name with a `_final` suffix. Either way the final
/// directory sits under `base_dir`.
pub fn final_run_directory(
    weights_path: Option<&Path>,
    run_dir: &Path,
    base_dir: &Path,
) -> PathBuf {
    let name = match weights_path.and_then(|p| p.file_stem()).and_then(|s| s.to_str()) {
        Some(stem) => format!("{stem}_eval"),
        None => {
            let run_name = run_dir
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("run");
            format!("{run_name}_final")
        }
    };
    base_dir.join(name)
}

/// Promote a run directory to its final location
///
/// Replaces anything already at `final_dir`. The displaced directory is
/// renamed aside first and removed only after the run directory has been
/// renamed into place, so an interruption at any point leaves both the
/// old and the new results on disk.
pub fn finalize_run(run_dir: &Path, final_dir: &Path) -> Result<(), HarnessError> {
    let displaced = final_dir.with_extension("old");

    if displaced.exists() {
        fs::remove_dir_all(&displaced).map_err(|e| HarnessError::io(&displaced, e))?;
    }
    if final_dir.exists() {
        fs::rename(final_dir, &displaced).map_err(|e| HarnessError::io(final_dir, e))?;
    }

    fs::rename(run_dir, final_dir).map_err(|e| HarnessError::io(run_dir, e))?;

    if displaced.exists() {
        fs::remove_dir_all(&displaced).map_err(|e| HarnessError::io(&displaced, e))?;
    }

    tracing::info!(final_dir = %final_dir.display(), "promoted run directory");
    Ok(())
}

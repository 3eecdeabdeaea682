//! Resolving a run configuration into loaded models
//!
//! A model lives in a directory holding `model.safetensors`, `model.json`
//! and `tokenizer.json`. A base-model identifier resolves to a directory
//! of that name under the configured model root; an explicit checkpoint
//! path wins over the identifier. LoRA adapters live in their own
//! directory as `adapter.safetensors` + `adapter.json`.

use crate::checkpoint::{load_lora_adapter, load_policy_checkpoint, load_reward_checkpoint};
use crate::device::Device;
use crate::policy::PolicyLm;
use crate::reward::RewardLm;
use cotbench_config::{Precision, RunConfig};
use cotbench_tokenizer::Tokenizer;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while resolving or loading model resources
#[derive(Debug, Error)]
pub enum LoadError {
    /// No weights at the resolved location
    #[error("model weights not found under {}", .path.display())]
    MissingWeights {
        /// Directory that was searched
        path: PathBuf,
    },
    /// No tokenizer next to the weights
    #[error("tokenizer not found under {}", .path.display())]
    MissingTokenizer {
        /// Directory that was searched
        path: PathBuf,
    },
    /// LoRA was requested without an adapter location
    #[error("use_lora is set but no adapter_path is configured")]
    MissingAdapter,
    /// The requested precision cannot run on the selected device
    #[error("precision {precision} is not supported on {device}")]
    UnsupportedPrecision {
        /// Requested precision
        precision: Precision,
        /// Selected device
        device: Device,
    },
    /// The checkpoint existed but could not be loaded
    #[error("failed to load checkpoint under {}", .path.display())]
    Checkpoint {
        /// Directory the load targeted
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },
}

/// Where base weights come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Named base model, resolved under the configured model root
    Identifier(String),
    /// Explicit checkpoint directory
    Checkpoint(PathBuf),
}

impl ModelSource {
    /// Pick the source for a run: an explicit checkpoint wins
    pub fn from_config(config: &RunConfig) -> Self {
        match &config.weights_path {
            Some(path) => ModelSource::Checkpoint(path.clone()),
            None => ModelSource::Identifier(config.model_name.clone()),
        }
    }

    /// Directory this source resolves to
    pub fn resolve_dir(&self, model_root: &Path) -> PathBuf {
        match self {
            ModelSource::Identifier(name) => model_root.join(name),
            ModelSource::Checkpoint(path) => path.clone(),
        }
    }
}

/// How the policy weights are assembled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsPlan {
    /// Base weights only
    Full {
        /// Base weights location
        source: ModelSource,
    },
    /// Base weights plus a LoRA adapter
    Lora {
        /// Base weights location
        source: ModelSource,
        /// Adapter directory
        adapter: PathBuf,
    },
}

impl WeightsPlan {
    /// Build the plan for a run, validating the LoRA combination
    pub fn from_config(config: &RunConfig) -> Result<Self, LoadError> {
        let source = ModelSource::from_config(config);
        if config.use_lora {
            let adapter = config.adapter_path.clone().ok_or(LoadError::MissingAdapter)?;
            Ok(WeightsPlan::Lora { source, adapter })
        } else {
            Ok(WeightsPlan::Full { source })
        }
    }

    /// The base-weights source of this plan
    pub fn source(&self) -> &ModelSource {
        match self {
            WeightsPlan::Full { source } => source,
            WeightsPlan::Lora { source, .. } => source,
        }
    }
}

fn check_precision(precision: Precision, device: &Device) -> Result<(), LoadError> {
    // Half precision needs device support; the host fallback is f32 only
    if precision == Precision::Float16 && !device.is_cuda() {
        return Err(LoadError::UnsupportedPrecision {
            precision,
            device: *device,
        });
    }
    Ok(())
}

/// Load the policy model and its tokenizer
///
/// # Arguments
/// * `plan` - Full or LoRA weights plan
/// * `precision` - Numeric precision to run at
/// * `device` - Device the model is placed on
/// * `model_root` - Directory identifiers resolve under
///
/// # Returns
/// Ready-to-use `(model, tokenizer)`; every failure is fatal, nothing is
/// retried
pub fn load_policy(
    plan: &WeightsPlan,
    precision: Precision,
    device: &Device,
    model_root: &Path,
) -> Result<(PolicyLm, Tokenizer), LoadError> {
    check_precision(precision, device)?;

    let dir = plan.source().resolve_dir(model_root);
    let stem = dir.join("model");
    if !stem.with_extension("safetensors").exists() {
        return Err(LoadError::MissingWeights { path: dir });
    }

    let (model, metadata) =
        load_policy_checkpoint(&stem).map_err(|source| LoadError::Checkpoint {
            path: dir.clone(),
            source,
        })?;
    tracing::info!(
        step = metadata.step,
        dir = %dir.display(),
        "loaded policy checkpoint"
    );

    let model = match plan {
        WeightsPlan::Full { .. } => model,
        WeightsPlan::Lora { adapter, .. } => {
            let adapter_stem = adapter.join("adapter");
            let adapter =
                load_lora_adapter(&adapter_stem, model.config()).map_err(|source| {
                    LoadError::Checkpoint {
                        path: adapter_stem.clone(),
                        source,
                    }
                })?;
            model.with_adapter(adapter)
        }
    };

    if !dir.join("tokenizer.json").exists() {
        return Err(LoadError::MissingTokenizer { path: dir });
    }
    let tokenizer = Tokenizer::from_directory(&dir).map_err(|source| LoadError::Checkpoint {
        path: dir.clone(),
        source,
    })?;

    Ok((model.with_precision(precision), tokenizer))
}

/// Load the separately configured reward model
pub fn load_reward(
    path: &Path,
    precision: Precision,
    device: &Device,
) -> Result<RewardLm, LoadError> {
    check_precision(precision, device)?;

    let stem = path.join("model");
    if !stem.with_extension("safetensors").exists() {
        return Err(LoadError::MissingWeights {
            path: path.to_path_buf(),
        });
    }

    load_reward_checkpoint(&stem).map_err(|source| LoadError::Checkpoint {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotbench_config::RunConfig;

    fn config(yaml: &str) -> RunConfig {
        RunConfig::from_yaml_str(yaml).expect("Failed to parse config")
    }

    #[test]
    fn test_checkpoint_wins_over_identifier() {
        let config = config(
            r#"
model_name: base-policy
weights_path: runs/policy_04_12-30
learning_rate: 1e-4
epochs: 1
batch_size: 2
"#,
        );
        let source = ModelSource::from_config(&config);
        assert_eq!(
            source,
            ModelSource::Checkpoint(PathBuf::from("runs/policy_04_12-30"))
        );
    }

    #[test]
    fn test_identifier_resolves_under_model_root() {
        let source = ModelSource::Identifier("base-policy".to_string());
        assert_eq!(
            source.resolve_dir(Path::new("models")),
            PathBuf::from("models/base-policy")
        );
    }

    #[test]
    fn test_lora_without_adapter_is_invalid() {
        let config = config(
            r#"
model_name: base-policy
use_lora: true
learning_rate: 1e-4
epochs: 1
batch_size: 2
"#,
        );
        let err = WeightsPlan::from_config(&config).unwrap_err();
        assert!(matches!(err, LoadError::MissingAdapter));
    }

    #[test]
    fn test_half_precision_rejected_on_cpu() {
        let err = check_precision(Precision::Float16, &Device::Cpu).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedPrecision { .. }));
        assert!(check_precision(Precision::Float16, &Device::Cuda(0)).is_ok());
        assert!(check_precision(Precision::Float32, &Device::Cpu).is_ok());
    }

    #[test]
    fn test_missing_weights_reported() {
        let plan = WeightsPlan::Full {
            source: ModelSource::Identifier("ghost".to_string()),
        };
        let err = load_policy(
            &plan,
            Precision::Float32,
            &Device::Cpu,
            Path::new("definitely-not-a-dir"),
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::MissingWeights { .. }));
    }
}

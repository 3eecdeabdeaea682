//! Typed run configuration loaded from YAML
//!
//! This crate replaces an untyped option dictionary with a single
//! `RunConfig` record: required keys are validated at load time, numeric
//! fields are coerced whether they arrive as YAML numbers or as strings
//! (`learning_rate: "3e-5"` is accepted), and unknown keys pass through
//! untouched so a run directory snapshot preserves the full file.
//!
//! Loading has no side effects. Anything environment-shaped (for example
//! exporting `CUDA_VISIBLE_DEVICES`) is done explicitly by the binary that
//! owns the process, with the config passed by reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while loading or validating a run configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file {}", .path.display())]
    Io {
        /// Path that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The file was not valid YAML
    #[error("invalid YAML in config")]
    Yaml(#[from] serde_yaml::Error),
    /// The document root was not a mapping of option names to values
    #[error("config root must be a mapping of option names to values")]
    NotAMapping,
    /// A required key was absent
    #[error("missing required config key `{0}`")]
    MissingKey(&'static str),
    /// A key was present but held an unusable value
    #[error("config key `{key}` has an invalid value: {reason}")]
    InvalidValue {
        /// Offending key
        key: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Numeric format used for model computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit IEEE float
    Float32,
    /// 16-bit IEEE float
    Float16,
    /// bfloat16
    BFloat16,
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float32" | "fp32" => Ok(Precision::Float32),
            "float16" | "fp16" => Ok(Precision::Float16),
            "bfloat16" | "bf16" => Ok(Precision::BFloat16),
            other => Err(format!("unknown precision `{other}`")),
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Precision::Float32 => "float32",
            Precision::Float16 => "float16",
            Precision::BFloat16 => "bfloat16",
        };
        f.write_str(name)
    }
}

/// Complete run configuration
///
/// Built once at process start and passed by reference to every component.
/// Fields marked required fail loading with [`ConfigError::MissingKey`];
/// every other field carries its documented default.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    /// Base model identifier (required)
    pub model_name: String,
    /// Optimizer learning rate (required)
    pub learning_rate: f32,
    /// Number of training epochs (required)
    pub epochs: usize,
    /// Batch size for training and inference (required)
    pub batch_size: usize,

    /// Optimizer weight decay (default 0.0)
    pub weight_decay: f32,
    /// Learning-rate warmup steps (default 0)
    pub warmup_steps: usize,
    /// Batch size for evaluation (defaults to `batch_size`)
    pub eval_batch_size: usize,
    /// Gradient accumulation steps (default 1)
    pub gradient_accumulation_steps: usize,
    /// Metric logging interval in steps (default 50)
    pub logging_steps: usize,
    /// Evaluation interval in steps (default 100)
    pub eval_steps: usize,
    /// Checkpoint interval in steps (default 200)
    pub save_steps: usize,
    /// Maximum number of retained checkpoints (default 2)
    pub save_total_limit: usize,

    /// Load the policy as a LoRA-adapted model (default false)
    pub use_lora: bool,
    /// Local checkpoint to load instead of `model_name`
    pub weights_path: Option<PathBuf>,
    /// LoRA adapter checkpoint, required when `use_lora` is set
    pub adapter_path: Option<PathBuf>,
    /// Separately loaded reward model checkpoint
    pub reward_weights_path: Option<PathBuf>,
    /// Numeric precision for model computation (default float32)
    pub precision: Precision,
    /// Root directory for run and checkpoint output (default "checkpoints")
    pub checkpoint_dir: PathBuf,
    /// Root directory under which model identifiers resolve (default "models")
    pub model_dir: PathBuf,
    /// Root directory for dataset files (default "data")
    pub data_dir: PathBuf,
    /// Name of the per-batch results file (default "results.jsonl")
    pub output_file_name: String,
    /// Dataset name, resolved as `{data_dir}/{dataset_name}.jsonl` (default "gsm8k")
    pub dataset_name: String,

    /// Maximum tokens generated per prompt (default 256)
    pub max_new_tokens: usize,
    /// Sampling temperature (default 1.0)
    pub temperature: f32,
    /// Nucleus sampling threshold (default 1.0)
    pub top_p: f32,
    /// Sample instead of greedy decoding (default false)
    pub do_sample: bool,
    /// Stop beam search once the best beam finishes (default false)
    pub early_stopping: bool,
    /// Repetition penalty over already-emitted tokens (default 1.0)
    pub repetition_penalty: f32,
    /// Beam count, 1 disables beam search (default 1)
    pub num_beams: usize,
    /// Seed for sampling and shuffling (default entropy)
    pub seed: Option<u64>,
    /// Value exported as CUDA_VISIBLE_DEVICES by the binary, if set
    pub cuda_visible_devices: Option<String>,

    /// Unknown keys, preserved verbatim for the run snapshot
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RunConfig {
    /// Load and validate a configuration file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML config file
    ///
    /// # Returns
    /// The validated configuration, or a [`ConfigError`] naming the first
    /// problem found
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(config = ?config, "loaded run configuration");
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let root: serde_yaml::Value = serde_yaml::from_str(text)?;
        let mapping = match root {
            serde_yaml::Value::Mapping(m) => m,
            _ => return Err(ConfigError::NotAMapping),
        };

        let mut fields: BTreeMap<String, serde_yaml::Value> = BTreeMap::new();
        for (key, value) in mapping {
            let key = key
                .as_str()
                .ok_or(ConfigError::NotAMapping)?
                .to_string();
            fields.insert(key, value);
        }

        let model_name =
            take_string(&mut fields, "model_name")?.ok_or(ConfigError::MissingKey("model_name"))?;
        let learning_rate = take_f32(&mut fields, "learning_rate")?
            .ok_or(ConfigError::MissingKey("learning_rate"))?;
        let epochs = take_usize(&mut fields, "epochs")?.ok_or(ConfigError::MissingKey("epochs"))?;
        let batch_size =
            take_usize(&mut fields, "batch_size")?.ok_or(ConfigError::MissingKey("batch_size"))?;

        let weight_decay = take_f32(&mut fields, "weight_decay")?.unwrap_or(0.0);
        let warmup_steps = take_usize(&mut fields, "warmup_steps")?.unwrap_or(0);
        let eval_batch_size = take_usize(&mut fields, "eval_batch_size")?.unwrap_or(batch_size);
        let gradient_accumulation_steps =
            take_usize(&mut fields, "gradient_accumulation_steps")?.unwrap_or(1);
        let logging_steps = take_usize(&mut fields, "logging_steps")?.unwrap_or(50);
        let eval_steps = take_usize(&mut fields, "eval_steps")?.unwrap_or(100);
        let save_steps = take_usize(&mut fields, "save_steps")?.unwrap_or(200);
        let save_total_limit = take_usize(&mut fields, "save_total_limit")?.unwrap_or(2);

        let use_lora = take_bool(&mut fields, "use_lora")?.unwrap_or(false);
        let weights_path = take_string(&mut fields, "weights_path")?.map(PathBuf::from);
        let adapter_path = take_string(&mut fields, "adapter_path")?.map(PathBuf::from);
        let reward_weights_path =
            take_string(&mut fields, "reward_weights_path")?.map(PathBuf::from);

        let precision = match take_string(&mut fields, "precision")? {
            Some(text) => {
                Precision::from_str(&text).map_err(|reason| ConfigError::InvalidValue {
                    key: "precision".to_string(),
                    reason,
                })?
            }
            None => Precision::Float32,
        };

        let checkpoint_dir = take_string(&mut fields, "checkpoint_dir")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("checkpoints"));
        let model_dir = take_string(&mut fields, "model_dir")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("models"));
        let data_dir = take_string(&mut fields, "data_dir")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        let output_file_name = take_string(&mut fields, "output_file_name")?
            .unwrap_or_else(|| "results.jsonl".to_string());
        let dataset_name =
            take_string(&mut fields, "dataset_name")?.unwrap_or_else(|| "gsm8k".to_string());

        let max_new_tokens = take_usize(&mut fields, "max_new_tokens")?.unwrap_or(256);
        let temperature = take_f32(&mut fields, "temperature")?.unwrap_or(1.0);
        let top_p = take_f32(&mut fields, "top_p")?.unwrap_or(1.0);
        let do_sample = take_bool(&mut fields, "do_sample")?.unwrap_or(false);
        let early_stopping = take_bool(&mut fields, "early_stopping")?.unwrap_or(false);
        let repetition_penalty = take_f32(&mut fields, "repetition_penalty")?.unwrap_or(1.0);
        let num_beams = take_usize(&mut fields, "num_beams")?.unwrap_or(1).max(1);
        let seed = take_u64(&mut fields, "seed")?;
        let cuda_visible_devices = take_string(&mut fields, "cuda_visible_devices")?;

        Ok(RunConfig {
            model_name,
            learning_rate,
            epochs,
            batch_size,
            weight_decay,
            warmup_steps,
            eval_batch_size,
            gradient_accumulation_steps,
            logging_steps,
            eval_steps,
            save_steps,
            save_total_limit,
            use_lora,
            weights_path,
            adapter_path,
            reward_weights_path,
            precision,
            checkpoint_dir,
            model_dir,
            data_dir,
            output_file_name,
            dataset_name,
            max_new_tokens,
            temperature,
            top_p,
            do_sample,
            early_stopping,
            repetition_penalty,
            num_beams,
            seed,
            cuda_visible_devices,
            extra: fields,
        })
    }

    /// Short model-name prefix used in run directory names
    pub fn model_prefix(&self) -> String {
        self.model_name.chars().take(4).collect()
    }
}

fn take(fields: &mut BTreeMap<String, serde_yaml::Value>, key: &str) -> Option<serde_yaml::Value> {
    match fields.remove(key) {
        Some(serde_yaml::Value::Null) | None => None,
        Some(value) => Some(value),
    }
}

fn invalid(key: &str, value: &serde_yaml::Value, expected: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("expected {expected}, got `{value:?}`"),
    }
}

fn take_f32(
    fields: &mut BTreeMap<String, serde_yaml::Value>,
    key: &str,
) -> Result<Option<f32>, ConfigError> {
    match take(fields, key) {
        None => Ok(None),
        Some(value) => {
            if let Some(number) = value.as_f64() {
                return Ok(Some(number as f32));
            }
            if let Some(text) = value.as_str() {
                if let Ok(number) = text.trim().parse::<f64>() {
                    return Ok(Some(number as f32));
                }
            }
            Err(invalid(key, &value, "a number"))
        }
    }
}

fn take_usize(
    fields: &mut BTreeMap<String, serde_yaml::Value>,
    key: &str,
) -> Result<Option<usize>, ConfigError> {
    match take(fields, key) {
        None => Ok(None),
        Some(value) => {
            if let Some(number) = value.as_u64() {
                return Ok(Some(number as usize));
            }
            if let Some(text) = value.as_str() {
                if let Ok(number) = text.trim().parse::<usize>() {
                    return Ok(Some(number));
                }
            }
            // Whole-valued floats coerce the way the untyped loader cast them
            if let Some(number) = value.as_f64() {
                if number >= 0.0 && number.fract() == 0.0 {
                    return Ok(Some(number as usize));
                }
            }
            Err(invalid(key, &value, "a non-negative integer"))
        }
    }
}

fn take_u64(
    fields: &mut BTreeMap<String, serde_yaml::Value>,
    key: &str,
) -> Result<Option<u64>, ConfigError> {
    match take(fields, key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(key, &value, "a non-negative integer")),
    }
}

fn take_bool(
    fields: &mut BTreeMap<String, serde_yaml::Value>,
    key: &str,
) -> Result<Option<bool>, ConfigError> {
    match take(fields, key) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| invalid(key, &value, "a boolean")),
    }
}

fn take_string(
    fields: &mut BTreeMap<String, serde_yaml::Value>,
    key: &str,
) -> Result<Option<String>, ConfigError> {
    match take(fields, key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| invalid(key, &value, "a string")),
    }
}

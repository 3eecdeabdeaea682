//! Checkpoint save/load for policy, reward, and adapter weights
//!
//! A checkpoint is a pair of sibling files sharing a stem: weights in
//! SafeTensors written by the framework's serializer, and a JSON sidecar
//! holding the architecture dimensions plus training metadata. Loading
//! rebuilds the module from the sidecar and fills its weights in place.

use crate::policy::{LoraAdapter, NetConfig, PolicyLm};
use crate::reward::RewardLm;
use anyhow::{Context, Result};
use aprender::nn::serialize::{load_model, save_model};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Checkpoint format version for compatibility checking
const CHECKPOINT_VERSION: &str = "1.0.0";

/// Training information carried next to the weights
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Training step number
    #[serde(default)]
    pub step: usize,
    /// Loss value at this checkpoint
    #[serde(default)]
    pub loss: Option<f32>,
    /// Learning rate at this checkpoint
    #[serde(default)]
    pub learning_rate: Option<f32>,
    /// Additional key-value metadata
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    version: String,
    config: NetConfig,
    #[serde(default)]
    metadata: CheckpointMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct AdapterSidecar {
    version: String,
    rank: usize,
}

fn weights_file(stem: &Path) -> std::path::PathBuf {
    stem.with_extension("safetensors")
}

fn sidecar_file(stem: &Path) -> std::path::PathBuf {
    stem.with_extension("json")
}

fn write_sidecar<S: Serialize>(stem: &Path, sidecar: &S) -> Result<()> {
    let path = sidecar_file(stem);
    let json = serde_json::to_string_pretty(sidecar).context("Failed to serialize sidecar")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn read_sidecar<S: for<'de> Deserialize<'de>>(stem: &Path) -> Result<S> {
    let path = sidecar_file(stem);
    let json = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

fn ensure_parent(stem: &Path) -> Result<()> {
    if let Some(parent) = stem.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Save a policy checkpoint
///
/// # Arguments
/// * `model` - The policy model to save
/// * `stem` - Checkpoint stem; `.safetensors` and `.json` siblings are written
/// * `metadata` - Optional training metadata
pub fn save_policy_checkpoint(
    model: &PolicyLm,
    stem: &Path,
    metadata: Option<CheckpointMetadata>,
) -> Result<()> {
    ensure_parent(stem)?;

    let weights_path = weights_file(stem);
    save_model(model, &weights_path)
        .map_err(|e| anyhow::anyhow!("Failed to save weights: {}", e))?;

    write_sidecar(
        stem,
        &Sidecar {
            version: CHECKPOINT_VERSION.to_string(),
            config: *model.config(),
            metadata: metadata.unwrap_or_default(),
        },
    )
}

/// Load a policy checkpoint
///
/// # Returns
/// The rebuilt model and the metadata written when it was saved
pub fn load_policy_checkpoint(stem: &Path) -> Result<(PolicyLm, CheckpointMetadata)> {
    let sidecar: Sidecar = read_sidecar(stem)?;
    let mut model = PolicyLm::new(sidecar.config);

    let weights_path = weights_file(stem);
    load_model(&mut model, &weights_path)
        .map_err(|e| anyhow::anyhow!("Failed to load weights: {}", e))?;

    Ok((model, sidecar.metadata))
}

/// Save a reward checkpoint
pub fn save_reward_checkpoint(
    model: &RewardLm,
    stem: &Path,
    metadata: Option<CheckpointMetadata>,
) -> Result<()> {
    ensure_parent(stem)?;

    let weights_path = weights_file(stem);
    save_model(model, &weights_path)
        .map_err(|e| anyhow::anyhow!("Failed to save weights: {}", e))?;

    write_sidecar(
        stem,
        &Sidecar {
            version: CHECKPOINT_VERSION.to_string(),
            config: *model.config(),
            metadata: metadata.unwrap_or_default(),
        },
    )
}

/// Load a reward checkpoint
pub fn load_reward_checkpoint(stem: &Path) -> Result<RewardLm> {
    let sidecar: Sidecar = read_sidecar(stem)?;
    let mut model = RewardLm::new(sidecar.config);

    let weights_path = weights_file(stem);
    load_model(&mut model, &weights_path)
        .map_err(|e| anyhow::anyhow!("Failed to load weights: {}", e))?;

    Ok(model)
}

/// Load a LoRA adapter checkpoint
///
/// The adapter's projection shapes come from the base model's dimensions
/// plus the rank recorded in the adapter sidecar.
pub fn load_lora_adapter(stem: &Path, base: &NetConfig) -> Result<LoraAdapter> {
    let sidecar: AdapterSidecar = read_sidecar(stem)?;
    let mut adapter = LoraAdapter::new(base.n_embd, base.vocab_size, sidecar.rank);

    let weights_path = weights_file(stem);
    load_model(&mut adapter, &weights_path)
        .map_err(|e| anyhow::anyhow!("Failed to load adapter weights: {}", e))?;

    Ok(adapter)
}

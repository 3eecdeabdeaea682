//! Policy and reward models for cotbench
//!
//! This crate owns everything between the run configuration and a model
//! that can complete text: device/precision resolution, the sum-typed
//! loading plan (full weights vs. LoRA adapter), checkpoint round-tripping
//! through the framework's serializer, and the generation driver (greedy,
//! nucleus sampling, and beam search).
//!
//! The network bodies here are deliberately small assemblies of framework
//! modules. Heavy kernels are the framework's concern; the rest of the
//! workspace depends only on the [`CausalLm`] seam and the
//! [`TextGenerator`] trait.

pub mod checkpoint;
pub mod device;
pub mod generate;
pub mod lm;
pub mod loader;
pub mod policy;
pub mod reward;

pub use checkpoint::{
    load_lora_adapter, load_policy_checkpoint, load_reward_checkpoint, save_policy_checkpoint,
    save_reward_checkpoint, CheckpointMetadata,
};
pub use device::Device;
pub use generate::{GenerationParams, GenerationSession, TextGenerator};
pub use lm::CausalLm;
pub use loader::{load_policy, load_reward, LoadError, ModelSource, WeightsPlan};
pub use policy::{LoraAdapter, NetConfig, PolicyLm};
pub use reward::RewardLm;

//! Reward-guided policy training
//!
//! Orchestrates RLHF-style fine-tuning: prompts in, sampled rollouts out,
//! rewards from a separately loaded scorer, and a filtered fine-tuning
//! step on the rollouts the reward model liked. Gradients, the optimizer,
//! and the scheduler all come from the ML framework; this crate only
//! sequences them.

pub mod dataset;
pub mod metrics;
pub mod optimizer;
pub mod train;

pub use dataset::{PromptBatch, PromptDataset};
pub use metrics::MetricsLogger;
pub use optimizer::{setup_optimizers, update_learning_rate, OptimizerConfig};
pub use train::{
    evaluate_mean_reward, prune_checkpoints, run_training_loop, select_rollouts, Rollout,
};

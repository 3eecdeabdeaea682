//! Optimizer and learning-rate scheduler setup

use anyhow::Result;
use aprender::nn::{
    optim::{AdamW, Optimizer},
    scheduler::WarmupCosineScheduler,
    LRScheduler, Module,
};
use cotbench_config::RunConfig;
use cotbench_model::PolicyLm;

/// Optimizer hyperparameters
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Learning rate
    pub learning_rate: f32,
    /// Weight decay
    pub weight_decay: f32,
    /// AdamW beta1
    pub beta1: f32,
    /// AdamW beta2
    pub beta2: f32,
    /// AdamW epsilon
    pub eps: f32,
    /// Linear warmup steps
    pub warmup_steps: usize,
    /// Total optimizer steps (for the cosine decay horizon)
    pub max_steps: usize,
    /// Floor the decayed learning rate never drops below
    pub min_lr: f32,
}

impl OptimizerConfig {
    /// Derive optimizer settings from the run config
    ///
    /// # Arguments
    /// * `config` - The run configuration
    /// * `max_steps` - Total optimizer steps the schedule spans
    pub fn from_run(config: &RunConfig, max_steps: usize) -> Self {
        Self {
            learning_rate: config.learning_rate,
            weight_decay: config.weight_decay,
            beta1: 0.9,
            beta2: 0.95,
            eps: 1e-8,
            warmup_steps: config.warmup_steps,
            max_steps: max_steps.max(1),
            min_lr: config.learning_rate * 0.1,
        }
    }
}

/// Create the AdamW optimizer and warmup-cosine scheduler for a policy
///
/// # Arguments
/// * `model` - The policy model (mutable access for its parameters)
/// * `config` - Optimizer configuration
pub fn setup_optimizers(
    model: &mut PolicyLm,
    config: &OptimizerConfig,
) -> Result<(AdamW, WarmupCosineScheduler)> {
    let parameters = model.parameters_mut();
    if parameters.is_empty() {
        anyhow::bail!("Policy model has no parameters to optimize");
    }

    let optimizer = AdamW::new(parameters, config.learning_rate);
    let scheduler =
        WarmupCosineScheduler::with_min_lr(config.warmup_steps, config.max_steps, config.min_lr);

    Ok((optimizer, scheduler))
}

/// Advance the scheduler, updating the optimizer's learning rate
pub fn update_learning_rate(scheduler: &mut WarmupCosineScheduler, optimizer: &mut AdamW) {
    scheduler.step(optimizer);
}

/// Current learning rate of the optimizer
pub fn current_learning_rate(optimizer: &AdamW) -> f32 {
    optimizer.lr()
}

//! The reward-filtered training loop
//!
//! Each round samples rollouts from the policy, scores them with the
//! reward model, and fine-tunes the policy on the rollouts scoring at or
//! above the batch mean. Gradient mechanics are entirely the framework's:
//! this loop only calls `backward`, `step` and `zero_grad` on the
//! configured cadence.

use crate::dataset::PromptDataset;
use crate::metrics::MetricsLogger;
use crate::optimizer::{
    current_learning_rate, setup_optimizers, update_learning_rate, OptimizerConfig,
};
use anyhow::{Context, Result};
use aprender::autograd::Tensor;
use aprender::nn::optim::Optimizer;
use cotbench_config::RunConfig;
use cotbench_harness::DistributedContext;
use cotbench_model::{
    save_policy_checkpoint, CausalLm, CheckpointMetadata, GenerationParams, GenerationSession,
    PolicyLm, RewardLm, TextGenerator,
};
use cotbench_tokenizer::Tokenizer;
use std::fs;
use std::path::{Path, PathBuf};

/// One sampled completion with its reward
#[derive(Debug, Clone)]
pub struct Rollout {
    /// Decoded rollout text (prompt plus continuation)
    pub text: String,
    /// Token ids of the full rollout
    pub ids: Vec<u32>,
    /// Reward model score
    pub reward: f32,
}

/// Indices of the rollouts kept for fine-tuning
///
/// Keeps everything scoring at or above the batch mean, so a batch where
/// every rollout ties still trains on all of them.
pub fn select_rollouts(rollouts: &[Rollout]) -> Vec<usize> {
    if rollouts.is_empty() {
        return Vec::new();
    }
    let mean = rollouts.iter().map(|r| r.reward).sum::<f32>() / rollouts.len() as f32;
    rollouts
        .iter()
        .enumerate()
        .filter(|(_, r)| r.reward >= mean)
        .map(|(idx, _)| idx)
        .collect()
}

/// Mean reward of fresh generations on held-out prompts
pub fn evaluate_mean_reward<M: CausalLm>(
    policy: &M,
    reward: &RewardLm,
    tokenizer: &Tokenizer,
    prompts: &[String],
    params: &GenerationParams,
) -> Result<f32> {
    if prompts.is_empty() {
        return Ok(0.0);
    }
    let session = GenerationSession::new(policy, tokenizer);
    let texts = session.generate(prompts, params)?;

    let mut total = 0.0f32;
    let mut count = 0usize;
    for text in &texts {
        let ids = tokenizer.encode(text)?;
        if ids.is_empty() {
            continue;
        }
        total += reward.score(&ids)?;
        count += 1;
    }
    Ok(if count > 0 { total / count as f32 } else { 0.0 })
}

/// Delete the oldest numbered checkpoints beyond the retention limit
///
/// Checkpoints are `checkpoint_{step}` stems inside `dir`; the final
/// checkpoint is unnumbered and never pruned.
pub fn prune_checkpoints(dir: &Path, limit: usize) -> Result<()> {
    let mut numbered: Vec<(usize, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to list checkpoint directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(step) = stem
            .strip_prefix("checkpoint_")
            .and_then(|s| s.parse::<usize>().ok())
        {
            numbered.push((step, path.with_extension("")));
        }
    }

    numbered.sort_by_key(|(step, _)| *step);
    while numbered.len() > limit {
        let (step, stem) = numbered.remove(0);
        for sibling in [stem.with_extension("safetensors"), stem.with_extension("json")] {
            if sibling.exists() {
                fs::remove_file(&sibling)
                    .with_context(|| format!("Failed to prune {}", sibling.display()))?;
            }
        }
        tracing::debug!(step, "pruned checkpoint");
    }
    Ok(())
}

/// Run reward-guided fine-tuning over the prompt dataset
///
/// # Arguments
/// * `config` - The run configuration (epochs, batching, cadences)
/// * `policy` - Policy model being trained
/// * `reward` - Frozen reward model
/// * `dataset` - Prompt dataset
/// * `tokenizer` - Shared tokenizer
/// * `ctx` - Distributed context; only the main process writes
/// * `output_dir` - Directory receiving checkpoints
pub fn run_training_loop(
    config: &RunConfig,
    policy: &mut PolicyLm,
    reward: &RewardLm,
    dataset: &PromptDataset,
    tokenizer: &Tokenizer,
    ctx: &DistributedContext,
    output_dir: &Path,
) -> Result<()> {
    if dataset.is_empty() {
        anyhow::bail!("Prompt dataset is empty");
    }

    let params = GenerationParams::from_config(config, tokenizer);
    let accumulation = config.gradient_accumulation_steps.max(1);
    let batches_per_epoch = dataset.len().div_ceil(config.batch_size.max(1));
    let max_steps = (config.epochs * batches_per_epoch).div_ceil(accumulation);

    let optimizer_config = OptimizerConfig::from_run(config, max_steps);
    let (mut optimizer, mut scheduler) = setup_optimizers(policy, &optimizer_config)?;
    let mut logger = MetricsLogger::new(config.logging_steps);
    let eval_prompts = dataset.eval_prompts(config.eval_batch_size);
    let base_seed = config.seed.unwrap_or(0);

    let mut batch_counter = 0usize;
    for epoch in 0..config.epochs {
        let batches = dataset.epoch_batches(
            config.batch_size,
            base_seed.wrapping_add(epoch as u64),
        );
        for batch in batches {
            batch_counter += 1;

            // Sample rollouts under the current policy
            let rollout_texts = {
                let session = GenerationSession::new(&*policy, tokenizer);
                session.generate(&batch.prompts, &params)?
            };

            let mut rollouts = Vec::with_capacity(rollout_texts.len());
            for text in rollout_texts {
                let ids = tokenizer.encode(&text)?;
                if ids.len() < 2 {
                    continue;
                }
                let score = reward.score(&ids)?;
                rollouts.push(Rollout {
                    ids,
                    reward: score,
                    text,
                });
            }
            if rollouts.is_empty() {
                continue;
            }
            let mean_reward =
                rollouts.iter().map(|r| r.reward).sum::<f32>() / rollouts.len() as f32;

            // Fine-tune on the rollouts the reward model liked
            let kept = select_rollouts(&rollouts);
            let mut loss_sum = 0.0f32;
            let mut loss_count = 0usize;
            for &idx in &kept {
                let ids = &rollouts[idx].ids;
                let inputs: Vec<f32> = ids[..ids.len() - 1].iter().map(|&t| t as f32).collect();
                let targets: Vec<f32> = ids[1..].iter().map(|&t| t as f32).collect();
                let input = Tensor::new(&inputs, &[1, inputs.len()]);
                let target = Tensor::new(&targets, &[1, targets.len()]);

                let loss = policy.forward_training(&input, &target)?;
                loss.backward();
                loss_sum += loss.item();
                loss_count += 1;
            }

            if batch_counter % accumulation == 0 {
                optimizer.step();
                optimizer.zero_grad();
                update_learning_rate(&mut scheduler, &mut optimizer);
            }

            let mean_loss = if loss_count > 0 {
                loss_sum / loss_count as f32
            } else {
                0.0
            };
            if ctx.is_main_process() {
                logger.log_step(mean_loss, mean_reward, current_learning_rate(&optimizer));
            }

            if ctx.is_main_process()
                && config.eval_steps > 0
                && batch_counter % config.eval_steps == 0
                && !eval_prompts.is_empty()
            {
                let held_out =
                    evaluate_mean_reward(&*policy, reward, tokenizer, &eval_prompts, &params)?;
                println!("Held-out reward at step {batch_counter}: {held_out:.4}");
            }

            if ctx.is_main_process()
                && config.save_steps > 0
                && batch_counter % config.save_steps == 0
            {
                let stem = output_dir.join(format!("checkpoint_{batch_counter}"));
                save_policy_checkpoint(
                    policy,
                    &stem,
                    Some(CheckpointMetadata {
                        step: batch_counter,
                        loss: Some(mean_loss),
                        learning_rate: Some(current_learning_rate(&optimizer)),
                        ..Default::default()
                    }),
                )?;
                prune_checkpoints(output_dir, config.save_total_limit)?;
            }
        }
    }

    if ctx.is_main_process() {
        save_policy_checkpoint(
            policy,
            &output_dir.join("checkpoint_final"),
            Some(CheckpointMetadata {
                step: batch_counter,
                ..Default::default()
            }),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rollout(reward: f32) -> Rollout {
        Rollout {
            text: String::new(),
            ids: vec![1, 2],
            reward,
        }
    }

    #[test]
    fn test_selects_at_or_above_mean() {
        let rollouts = vec![rollout(1.0), rollout(0.0), rollout(0.5), rollout(0.2)];
        assert_eq!(select_rollouts(&rollouts), vec![0, 2]);
    }

    #[test]
    fn test_ties_keep_everything() {
        let rollouts = vec![rollout(0.3), rollout(0.3), rollout(0.3)];
        assert_eq!(select_rollouts(&rollouts), vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_rollouts_select_nothing() {
        assert!(select_rollouts(&[]).is_empty());
    }
}

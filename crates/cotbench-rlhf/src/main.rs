//! Policy training entry point
//!
//! Joins the (optional) distributed group, loads the tokenizer, policy and
//! reward models, and hands off to the training loop. Only the main
//! process writes checkpoints and logs. Any failure propagates and exits
//! non-zero.

use anyhow::{Context, Result};
use clap::Parser;
use cotbench_config::RunConfig;
use cotbench_harness::{create_run_directory, init_distributed};
use cotbench_model::{load_policy, load_reward, Device, WeightsPlan};
use cotbench_rlhf::{run_training_loop, PromptDataset};
use std::path::PathBuf;

/// Command-line arguments for training
#[derive(Parser, Debug)]
#[command(name = "cotbench-rlhf")]
#[command(about = "Reward-guided policy fine-tuning")]
struct Args {
    /// Path to the YAML run configuration
    #[arg(long, short = 'c', default_value = "config.yaml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = RunConfig::from_file(&args.config)?;

    if let Some(devices) = &config.cuda_visible_devices {
        std::env::set_var("CUDA_VISIBLE_DEVICES", devices);
    }

    let ctx = init_distributed()?;
    let device = Device::select(ctx.local_rank());
    println!("Using device: {device}");

    let plan = WeightsPlan::from_config(&config)?;
    let (mut policy, tokenizer) = load_policy(&plan, config.precision, &device, &config.model_dir)?;

    let reward_path = config
        .reward_weights_path
        .as_ref()
        .context("reward_weights_path must be configured for policy training")?;
    let reward = load_reward(reward_path, config.precision, &device)?;

    let dataset = PromptDataset::load(&config.dataset_name, &config.data_dir)?;

    let run_dir = create_run_directory(
        &config.checkpoint_dir,
        &config.model_prefix(),
        Some(&config),
    )?;

    run_training_loop(&config, &mut policy, &reward, &dataset, &tokenizer, &ctx, &run_dir)?;

    if ctx.is_main_process() {
        println!("Training complete. Checkpoints saved to: {}", run_dir.display());
    }
    Ok(())
}

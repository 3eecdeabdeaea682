//! Inference entry point
//!
//! Loads `config.yaml` (or `--config`), resolves the model and dataset,
//! runs the batched generation loop, and promotes the run directory to
//! its final location. Any failure propagates and exits non-zero.

use anyhow::Result;
use clap::Parser;
use cotbench_config::RunConfig;
use cotbench_harness::{create_run_directory, final_run_directory, finalize_run, OutputWriter};
use cotbench_infer::{run_inference, EvalDataset};
use cotbench_model::{load_policy, Device, GenerationParams, GenerationSession, WeightsPlan};
use std::path::PathBuf;

/// Command-line arguments for inference
#[derive(Parser, Debug)]
#[command(name = "cotbench-infer")]
#[command(about = "Run batched generation with accuracy scoring")]
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

    let run_dir = create_run_directory(
        &config.checkpoint_dir,
        &config.model_prefix(),
        Some(&config),
    )?;
    let output_path = run_dir.join(&config.output_file_name);
    let final_dir = final_run_directory(
        config.weights_path.as_deref(),
        &run_dir,
        &config.checkpoint_dir,
    );

    println!("Loading Dataset...");
    let dataset = EvalDataset::load(&config.dataset_name, &config.data_dir)?;

    println!("Loading Model...");
    let device = Device::select(None);
    println!("Using device: {device}");
    let plan = WeightsPlan::from_config(&config)?;
    let (model, tokenizer) = load_policy(&plan, config.precision, &device, &config.model_dir)?;

    let params = GenerationParams::from_config(&config, &tokenizer);
    let session = GenerationSession::new(&model, &tokenizer);
    let mut writer = OutputWriter::open(&output_path)?;

    println!("Running Inference...");
    let summary = run_inference(&session, &dataset, &params, config.batch_size, &mut writer)?;

    println!("Model Accuracy: {:.2}%", summary.running_accuracy * 100.0);
    println!("Model Accuracy: {:.2}%", summary.mean_accuracy * 100.0);

    finalize_run(&run_dir, &final_dir)?;
    println!("Inference complete. Outputs saved to: {}", final_dir.display());
    Ok(())
}

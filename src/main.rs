use anyhow::{ensure, Context, Result};
use clap::Parser;
use rayon::ThreadPoolBuilder;
use tracing_subscriber::EnvFilter;

use deeplab_seg_rs::{Config, ImageProcessor};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    ensure!(config.model_path.exists(), "Model path does not exist");
    ensure!(config.input_dir.exists(), "Input directory does not exist");
    config
        .pipeline_config()
        .validate()
        .context("Invalid pipeline configuration")?;

    ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build_global()?;

    let processor = ImageProcessor::with_onnx_model(config.clone())
        .with_context(|| format!("Failed to load model: {}", config.model_path.display()))?;
    let summary = processor.process_directory()?;

    ensure!(
        summary.failed == 0,
        "{} of {} images failed",
        summary.failed,
        summary.processed + summary.failed
    );
    Ok(())
}

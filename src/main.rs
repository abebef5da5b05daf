//! Tabular Prediction - Main Entry Point
//!
//! Runs a trained classifier over a delimited input file and prints a preview.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tabpredict::config::{AppConfig, LogFormat};
use tabpredict::{run_predictions, RunOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Batch predictions for a trained tabular classifier
#[derive(Debug, Parser)]
#[command(name = "tabpredict", version, about)]
struct Cli {
    /// Serialized model (ONNX or XGBoost JSON)
    #[arg(long)]
    model: PathBuf,

    /// Ordered feature names (.npy, JSON array or one name per line)
    #[arg(long)]
    features: PathBuf,

    /// Delimited input file with a header row
    #[arg(long)]
    input: PathBuf,

    /// Optional preprocessor (ONNX or column transformer JSON)
    #[arg(long)]
    preprocessor: Option<PathBuf>,

    /// Optional metadata JSON with feature defaults
    #[arg(long)]
    meta: Option<PathBuf>,

    /// Write the results here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Rows shown in the preview
    #[arg(long)]
    sample_rows: Option<usize>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("tabpredict={}", config.logging.level).parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config)?;

    info!("Starting tabular prediction run");

    let options = RunOptions {
        model_path: cli.model,
        features_path: cli.features,
        input_path: cli.input,
        preprocessor_path: cli.preprocessor,
        meta_path: cli.meta,
        output_path: cli.output,
        sample_rows: cli.sample_rows.unwrap_or(config.preview.sample_rows),
    };

    let output = run_predictions(&options, &config).context("Prediction run failed")?;

    println!("Sample prediction output (first rows):");
    println!("{}", output.preview);

    output.metrics.print_summary();
    Ok(())
}

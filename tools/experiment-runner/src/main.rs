//! Multi-label Experiment Runner
//!
//! Trains every model of the bank (two ResNet-34 stems, EfficientNet-B0 and a
//! Vision Transformer) on the same dataset and keeps the best checkpoint of
//! each.

mod backend;
mod runner;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use mlabel_core::{setup_cli_logging, ExperimentArgs, ExperimentConfig};

use crate::backend::{backend_name, select_device, TrainingBackend};

fn main() -> Result<()> {
    let args = ExperimentArgs::parse();
    setup_cli_logging(args.verbose).context("Failed to initialize logging")?;

    let config =
        ExperimentConfig::from_args(&args).context("Invalid experiment configuration")?;
    print_banner(&config);

    let device = select_device(config.device.index);
    let report = runner::run::<TrainingBackend>(&config, device)
        .with_context(|| format!("Experiment in {} failed", config.output.path.display()))?;

    println!("\n{}", "Results".green().bold());
    for summary in &report.models {
        let f1 = summary
            .best_metrics
            .as_ref()
            .map(|m| format!("{:.4}", m.micro_f1))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} micro-F1 {}  epochs {}{}",
            summary.model.name(),
            f1,
            summary.epochs_run,
            if summary.stopped_early { " (early stop)" } else { "" }
        );
    }
    if let Some((kind, metrics)) = report.best_model() {
        println!(
            "\n{} {} (micro-F1 {:.4})",
            "Best model:".green().bold(),
            kind,
            metrics.micro_f1
        );
    }
    println!(
        "Summary saved to {}",
        runner::summary_path(&config.output.path).display()
    );

    Ok(())
}

fn print_banner(config: &ExperimentConfig) {
    let t = &config.training;
    println!("{}", "Multi-label Experiment Runner".bright_blue().bold());
    println!("{}", "=============================".bright_blue());
    println!("  Backend:       {}", backend_name());
    println!("  Data:          {}", config.data.manifest_path().display());
    println!("  Output:        {}", config.output.path.display());
    println!(
        "  Models:        {}",
        config
            .models
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Epochs:        {}", t.epochs);
    println!("  Batch size:    {}", t.batch_size);
    println!("  Learning rate: {:e}", t.learning_rate);
    println!("  Optimizer:     {}", t.optimizer.name());
    println!("  Loss:          {}", t.loss.name());
    if let Some(params) = &t.loss_params {
        println!("  Loss params:   {params:?}");
    }
    println!("  Test rotation: {}", config.data.augment_eval);
    if let Some(patience) = t.patience {
        println!("  Patience:      {patience}");
    }
}

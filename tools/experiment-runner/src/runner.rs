//! Runs every selected model of the bank on one shared dataset.

use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;
use colored::Colorize;
use mlabel_core::{
    ensure_output_dir, save_toml_config, ExperimentConfig, ModelKind, MultiLabelMetrics, Result,
};
use mlabel_dataset::{MultiLabelData, MultiLabelLoader};
use mlabel_training::{
    ExperimentModel, MultiLabelLoss, OptimizerSpec, OptimizerVisitor, Trainer, TrainerConfig,
    TrainingSummary,
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CONFIG_FILE: &str = "experiment_config.toml";
pub const SUMMARY_FILE: &str = "experiment_summary.json";

/// Per-model results of one experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub classes: Vec<String>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub optimizer: String,
    pub loss: String,
    pub models: Vec<TrainingSummary>,
}

impl ExperimentReport {
    /// Model with the highest best-epoch micro-F1
    pub fn best_model(&self) -> Option<(ModelKind, &MultiLabelMetrics)> {
        self.models
            .iter()
            .filter_map(|s| s.best_metrics.as_ref().map(|m| (s.model, m)))
            .fold(None, |best, (kind, metrics)| match best {
                Some((_, b)) if b.micro_f1 >= metrics.micro_f1 => best,
                _ => Some((kind, metrics)),
            })
    }
}

/// Hands the selected optimizer to a fresh trainer
struct TrainModel<B: AutodiffBackend> {
    model: ExperimentModel<B>,
    loss: MultiLabelLoss,
    config: TrainerConfig,
    train_loader: MultiLabelLoader<B>,
    test_loader: MultiLabelLoader<B::InnerBackend>,
}

impl<B: AutodiffBackend> OptimizerVisitor<ExperimentModel<B>, B> for TrainModel<B> {
    type Output = Result<TrainingSummary>;

    fn visit<O: Optimizer<ExperimentModel<B>, B>>(self, optimizer: O) -> Self::Output {
        Trainer::new(
            self.model,
            optimizer,
            self.loss,
            self.config,
            self.train_loader,
            self.test_loader,
        )
        .run_training()
    }
}

/// Trains the configured models one after another.
///
/// The dataset is loaded and the loaders are built once; every model gets a
/// fresh optimizer and writes `<path>/<model>.pt`.
pub fn run<B: AutodiffBackend>(
    config: &ExperimentConfig,
    device: B::Device,
) -> Result<ExperimentReport> {
    config.validate()?;
    let output = &config.output.path;
    ensure_output_dir(output)?;
    save_toml_config(config, &output.join(CONFIG_FILE))?;

    let loss = MultiLabelLoss::new(config.training.loss, config.training.loss_params.clone())?;
    let optimizer = OptimizerSpec::new(config.training.optimizer)
        .with_weight_decay(config.training.weight_decay);

    info!("Loading dataset from {}", config.data.manifest_path().display());
    let data = MultiLabelData::load(&config.data, config.seed)?;
    let num_classes = data.num_classes();
    config
        .effective_loss_params()
        .validate_for_classes(num_classes)?;
    info!(
        "{} classes, {} train / {} test samples",
        num_classes,
        data.train.len(),
        data.test.len()
    );

    let batch_size = config.training.batch_size;
    let workers = config.data.num_workers;
    let train_loader = data.train_loader::<B>(batch_size, workers, config.seed, &device);
    let test_loader =
        data.test_loader::<B::InnerBackend>(batch_size, workers, config.seed, &device);

    let mut summaries = Vec::with_capacity(config.models.len());
    for (i, kind) in config.models.iter().copied().enumerate() {
        println!(
            "\n{}",
            format!("Model {}/{}: {}", i + 1, config.models.len(), kind)
                .bright_cyan()
                .bold()
        );

        let model = ExperimentModel::<B>::for_image_size(
            kind,
            num_classes,
            config.data.image_size,
            &device,
        )?;
        let summary = optimizer.dispatch(TrainModel {
            model,
            loss: loss.clone(),
            config: TrainerConfig::from(config),
            train_loader: train_loader.clone(),
            test_loader: test_loader.clone(),
        })?;

        match &summary.best_metrics {
            Some(m) => println!(
                "  {} micro-F1 {:.4} at epoch {} -> {}",
                "Best:".green(),
                m.micro_f1,
                summary.best_epoch.unwrap_or_default(),
                summary.checkpoint.display()
            ),
            None => println!("  {}", "No epoch completed".yellow()),
        }
        summaries.push(summary);
    }

    let report = ExperimentReport {
        classes: data.classes.clone(),
        train_samples: data.train.len(),
        test_samples: data.test.len(),
        optimizer: config.training.optimizer.name().to_string(),
        loss: config.training.loss.name().to_string(),
        models: summaries,
    };
    let summary_path = summary_path(output);
    std::fs::write(&summary_path, serde_json::to_string_pretty(&report)?)?;
    info!("Summary saved to {}", summary_path.display());

    Ok(report)
}

pub fn summary_path(output: &Path) -> PathBuf {
    output.join(SUMMARY_FILE)
}

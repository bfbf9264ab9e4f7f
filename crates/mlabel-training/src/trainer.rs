//! Training loop for one model of the bank.
//!
//! This module provides:
//! - Epoch loop with forward/backward passes and optimizer steps
//! - Evaluation on the test loader after every epoch
//! - Best-checkpoint tracking on micro-F1
//! - Optional early stopping

use std::path::PathBuf;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::{backend::AutodiffBackend, ElementConversion};
use indicatif::{ProgressBar, ProgressStyle};
use mlabel_core::{
    EpochRecord, Error, ExperimentConfig, ModelKind, MultiLabelMetrics, Result, TrainingMetrics,
};
use mlabel_dataset::MultiLabelLoader;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointManager, CheckpointMetadata};
use crate::evaluator::evaluate;
use crate::loss::MultiLabelLoss;
use crate::model::ExperimentModel;

/// Configuration for the trainer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub num_epochs: usize,
    pub early_stopping_patience: Option<usize>,
    pub checkpoint_dir: PathBuf,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-5,
            num_epochs: 100,
            early_stopping_patience: None,
            checkpoint_dir: PathBuf::from("multi_label_output"),
        }
    }
}

impl From<&ExperimentConfig> for TrainerConfig {
    fn from(config: &ExperimentConfig) -> Self {
        Self {
            learning_rate: config.training.learning_rate,
            num_epochs: config.training.epochs,
            early_stopping_patience: config.training.patience,
            checkpoint_dir: config.output.path.clone(),
        }
    }
}

/// Best metric, patience and history across epochs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingState {
    pub epoch: usize,
    pub best_micro_f1: Option<f64>,
    pub best_epoch: Option<usize>,
    pub patience_counter: usize,
    pub training_history: TrainingMetrics,
}

impl TrainingState {
    /// Records an epoch and returns whether it improved on the best micro-F1.
    ///
    /// The first epoch always counts as an improvement; later epochs must be
    /// strictly better.
    pub fn update_epoch(&mut self, record: EpochRecord) -> bool {
        self.epoch = record.epoch;
        let f1 = record.metrics.micro_f1;

        let improved = match self.best_micro_f1 {
            None => true,
            Some(best) => f1 > best,
        };
        if improved {
            if let Some(best) = self.best_micro_f1 {
                info!("Test micro-F1 improved from {best:.4} to {f1:.4}");
            }
            self.best_micro_f1 = Some(f1);
            self.best_epoch = Some(record.epoch);
            self.patience_counter = 0;
        } else {
            self.patience_counter += 1;
        }

        self.training_history.add_epoch(record);
        improved
    }

    pub fn should_stop(&self, patience: Option<usize>) -> bool {
        patience.is_some_and(|p| self.patience_counter >= p)
    }
}

/// Outcome of training one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub model: ModelKind,
    pub epochs_run: usize,
    pub best_epoch: Option<usize>,
    pub best_metrics: Option<MultiLabelMetrics>,
    pub best_test_loss: Option<f64>,
    pub checkpoint: PathBuf,
    pub stopped_early: bool,
    pub duration_secs: f64,
    pub history: TrainingMetrics,
}

pub struct Trainer<B: AutodiffBackend, O> {
    model: ExperimentModel<B>,
    optimizer: O,
    loss: MultiLabelLoss,
    config: TrainerConfig,
    train_loader: MultiLabelLoader<B>,
    test_loader: MultiLabelLoader<B::InnerBackend>,
    state: TrainingState,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ExperimentModel<B>, B>,
{
    pub fn new(
        model: ExperimentModel<B>,
        optimizer: O,
        loss: MultiLabelLoss,
        config: TrainerConfig,
        train_loader: MultiLabelLoader<B>,
        test_loader: MultiLabelLoader<B::InnerBackend>,
    ) -> Self {
        Self {
            model,
            optimizer,
            loss,
            config,
            train_loader,
            test_loader,
            state: TrainingState::default(),
        }
    }

    /// Trains for the configured number of epochs, keeping the best
    /// checkpoint on disk.
    pub fn run_training(mut self) -> Result<TrainingSummary> {
        let kind = self.model.kind();
        let checkpoints = CheckpointManager::new(&self.config.checkpoint_dir, kind);
        let started = Instant::now();
        let mut stopped_early = false;

        info!(
            "Training {kind} for {} epochs (lr = {:e}, loss = {})",
            self.config.num_epochs,
            self.config.learning_rate,
            self.loss.kind()
        );

        for epoch in 1..=self.config.num_epochs {
            let train_loss = self.train_epoch(epoch)?;

            let valid_model = self.model.valid();
            let eval = evaluate(&valid_model, &self.test_loader, &self.loss)?;

            let record = EpochRecord {
                epoch,
                train_loss,
                test_loss: eval.loss,
                learning_rate: self.config.learning_rate,
                metrics: eval.metrics.clone(),
            };
            let improved = self.state.update_epoch(record);

            info!(
                "[{kind}] epoch {epoch}/{}: train_loss={train_loss:.4} test_loss={:.4} \
                 micro_f1={:.4} macro_f1={:.4} subset_acc={:.4} hamming_acc={:.4}{}",
                self.config.num_epochs,
                eval.loss,
                eval.metrics.micro_f1,
                eval.metrics.macro_f1,
                eval.metrics.subset_accuracy,
                eval.metrics.hamming_accuracy,
                if improved { " (best)" } else { "" }
            );

            if improved {
                let metadata = CheckpointMetadata::new(
                    kind,
                    valid_model.num_classes(),
                    epoch,
                    train_loss,
                    eval.loss,
                    eval.metrics.clone(),
                );
                let path = checkpoints.save(&valid_model, &metadata)?;
                debug!("Saved best {kind} weights to {}", path.display());
            }

            if self.state.should_stop(self.config.early_stopping_patience) {
                warn!(
                    "[{kind}] no improvement for {} epochs, stopping early",
                    self.state.patience_counter
                );
                stopped_early = true;
                break;
            }
        }

        let best = self.state.training_history.best();
        let best_metrics = best.map(|r| r.metrics.clone());
        let best_test_loss = best.map(|r| r.test_loss);

        Ok(TrainingSummary {
            model: kind,
            epochs_run: self.state.epoch,
            best_epoch: self.state.best_epoch,
            best_metrics,
            best_test_loss,
            checkpoint: checkpoints.model_path(),
            stopped_early,
            duration_secs: started.elapsed().as_secs_f64(),
            history: self.state.training_history,
        })
    }

    fn train_epoch(&mut self, epoch: usize) -> Result<f64> {
        let pb = ProgressBar::new(self.train_loader.num_items() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        let mut loss_sum = 0.0;
        let mut batches = 0usize;

        for batch in self.train_loader.iter() {
            let items = batch.targets.dims()[0];
            let logits = self.model.forward(batch.images);
            let loss = self.loss.forward(logits, batch.targets);

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                pb.abandon();
                return Err(Error::Training(format!(
                    "loss became {loss_value} in epoch {epoch}"
                )));
            }
            loss_sum += loss_value;
            batches += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            pb.set_message(format!("epoch {epoch} loss {loss_value:.4}"));
            pb.inc(items as u64);
        }
        pb.finish_and_clear();

        if batches == 0 {
            return Err(Error::Training("training loader produced no batches".to_string()));
        }
        Ok(loss_sum / batches as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::{OptimizerSpec, OptimizerVisitor};
    use burn::backend::{Autodiff, NdArray};
    use image::{GrayImage, Luma};
    use mlabel_dataset::{
        MultiLabelData, MultiLabelDataset, MultiLabelItem, PreprocessConfig, RandomRotation,
    };

    type TestBackend = Autodiff<NdArray>;

    fn record(epoch: usize, micro_f1: f64) -> EpochRecord {
        EpochRecord {
            epoch,
            train_loss: 1.0,
            test_loss: 1.0,
            learning_rate: 1e-3,
            metrics: MultiLabelMetrics {
                micro_f1,
                ..MultiLabelMetrics::default()
            },
        }
    }

    #[test]
    fn test_first_epoch_always_improves() {
        let mut state = TrainingState::default();
        assert!(state.update_epoch(record(1, 0.0)));
        assert_eq!(state.best_epoch, Some(1));
        assert_eq!(state.best_micro_f1, Some(0.0));
    }

    #[test]
    fn test_improvement_must_be_strict() {
        let mut state = TrainingState::default();
        assert!(state.update_epoch(record(1, 0.5)));
        assert!(!state.update_epoch(record(2, 0.5)));
        assert_eq!(state.patience_counter, 1);
        assert!(state.update_epoch(record(3, 0.6)));
        assert_eq!(state.patience_counter, 0);
        assert_eq!(state.best_epoch, Some(3));
        assert_eq!(state.training_history.epochs.len(), 3);
    }

    #[test]
    fn test_early_stopping() {
        let mut state = TrainingState::default();
        assert!(!state.should_stop(Some(2)));
        state.update_epoch(record(1, 0.4));
        state.update_epoch(record(2, 0.3));
        assert!(!state.should_stop(Some(2)));
        state.update_epoch(record(3, 0.4));
        assert!(state.should_stop(Some(2)));
        assert!(!state.should_stop(None));
    }

    #[test]
    fn test_trainer_config_from_experiment() {
        let mut experiment = ExperimentConfig::default();
        experiment.training.patience = Some(5);
        let config = TrainerConfig::from(&experiment);
        assert_eq!(config.learning_rate, 1e-5);
        assert_eq!(config.num_epochs, 100);
        assert_eq!(config.early_stopping_patience, Some(5));
        assert_eq!(config.checkpoint_dir, PathBuf::from("multi_label_output"));
    }

    struct TrainTiny {
        data: MultiLabelData,
        config: TrainerConfig,
    }

    impl OptimizerVisitor<ExperimentModel<TestBackend>, TestBackend> for TrainTiny {
        type Output = Result<TrainingSummary>;

        fn visit<O: Optimizer<ExperimentModel<TestBackend>, TestBackend>>(
            self,
            optimizer: O,
        ) -> Self::Output {
            let device = Default::default();
            let model = ExperimentModel::<TestBackend>::for_image_size(
                ModelKind::ResNetModified,
                2,
                16,
                &device,
            )?;
            let train = self.data.train_loader::<TestBackend>(2, 1, 42, &device);
            let test = self.data.test_loader::<NdArray>(2, 1, 42, &device);
            let loss = MultiLabelLoss::from_name("bce")?;
            Trainer::new(model, optimizer, loss, self.config, train, test).run_training()
        }
    }

    #[test]
    fn test_run_training_writes_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let items: Vec<MultiLabelItem> = (0..6u8)
            .map(|i| MultiLabelItem {
                image: GrayImage::from_pixel(16, 16, Luma([i * 40])),
                labels: vec![i % 2, (i % 3 == 0) as u8],
                path: format!("{i}.png").into(),
            })
            .collect();
        let dataset = MultiLabelDataset::from_items(items);
        let data = MultiLabelData {
            classes: vec!["a".into(), "b".into()],
            train: dataset.clone(),
            test: dataset,
            preprocess: PreprocessConfig::default().with_image_size(16),
            rotation: RandomRotation::new(30.0),
            augment_eval: true,
        };
        let config = TrainerConfig {
            learning_rate: 1e-3,
            num_epochs: 2,
            early_stopping_patience: None,
            checkpoint_dir: tmp.path().to_path_buf(),
        };

        let summary = OptimizerSpec::from_name("adam")
            .unwrap()
            .dispatch(TrainTiny { data, config })
            .unwrap();

        assert_eq!(summary.model, ModelKind::ResNetModified);
        assert_eq!(summary.epochs_run, 2);
        assert_eq!(summary.history.epochs.len(), 2);
        assert_eq!(summary.checkpoint, tmp.path().join("resnet_modified.pt"));
        assert!(summary.checkpoint.exists());

        let best = summary.history.best().unwrap();
        assert_eq!(summary.best_epoch, Some(best.epoch));
        assert_eq!(summary.best_metrics.as_ref(), Some(&best.metrics));

        let metadata = CheckpointManager::new(tmp.path(), ModelKind::ResNetModified)
            .load_metadata()
            .unwrap();
        assert_eq!(Some(metadata.epoch), summary.best_epoch);
    }
}

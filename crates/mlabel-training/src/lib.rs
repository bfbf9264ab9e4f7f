//! Model bank, losses, optimizers and training loop for the multi-label
//! benchmark.
//!
//! This crate provides:
//! - `model`: ResNet-34 (two stems), EfficientNet-B0 and a Vision Transformer
//! - `loss`: BCE, focal and asymmetric multi-label losses
//! - `optim`: optimizer selection by name
//! - `trainer`: the per-model training loop with best-checkpoint tracking

pub mod checkpoint;
pub mod evaluator;
pub mod loss;
pub mod model;
pub mod optim;
pub mod trainer;

pub use checkpoint::{checkpoint_path, metadata_path, CheckpointManager, CheckpointMetadata};
pub use evaluator::{evaluate, Evaluation};
pub use loss::MultiLabelLoss;
pub use model::{ExperimentModel, DEFAULT_IMAGE_SIZE};
pub use optim::{OptimizerSpec, OptimizerVisitor};
pub use trainer::{Trainer, TrainerConfig, TrainingState, TrainingSummary};

//! Best-model checkpointing.
//!
//! Each model has exactly one checkpoint in the output directory,
//! `<name>.pt`, holding the Burn record of the best weights seen so far, with
//! a `<name>.json` sidecar describing when and why it was written.

use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use mlabel_core::{Error, ModelKind, MultiLabelMetrics, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::model::ExperimentModel;

/// `<dir>/<model name>.pt`
pub fn checkpoint_path(dir: &Path, kind: ModelKind) -> PathBuf {
    dir.join(format!("{}.pt", kind.name()))
}

/// `<dir>/<model name>.json`
pub fn metadata_path(dir: &Path, kind: ModelKind) -> PathBuf {
    dir.join(format!("{}.json", kind.name()))
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub model: ModelKind,
    pub num_classes: usize,
    pub epoch: usize,
    pub train_loss: f64,
    pub test_loss: f64,
    pub metrics: MultiLabelMetrics,
    pub timestamp: String,
}

impl CheckpointMetadata {
    pub fn new(
        model: ModelKind,
        num_classes: usize,
        epoch: usize,
        train_loss: f64,
        test_loss: f64,
        metrics: MultiLabelMetrics,
    ) -> Self {
        Self {
            model,
            num_classes,
            epoch,
            train_loss,
            test_loss,
            metrics,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Writes and reads the checkpoint of one model
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    kind: ModelKind,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, kind: ModelKind) -> Self {
        Self {
            dir: dir.into(),
            kind,
        }
    }

    pub fn model_path(&self) -> PathBuf {
        checkpoint_path(&self.dir, self.kind)
    }

    pub fn metadata_path(&self) -> PathBuf {
        metadata_path(&self.dir, self.kind)
    }

    fn recorder() -> BinBytesRecorder<FullPrecisionSettings> {
        BinBytesRecorder::<FullPrecisionSettings>::default()
    }

    /// Overwrites the checkpoint with `model`
    pub fn save<B: Backend>(
        &self,
        model: &ExperimentModel<B>,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf> {
        let bytes = Recorder::<B>::record(&Self::recorder(), model.clone().into_record(), ())
            .map_err(|e| Error::Checkpoint(format!("Failed to record {}: {e}", self.kind)))?;

        let path = self.model_path();
        fs::write(&path, bytes)?;

        let json = serde_json::to_string_pretty(metadata)?;
        fs::write(self.metadata_path(), json)?;

        debug!("Checkpoint saved to {}", path.display());
        Ok(path)
    }

    /// Loads the saved weights into `model`
    pub fn load<B: Backend>(
        &self,
        model: ExperimentModel<B>,
        device: &B::Device,
    ) -> Result<ExperimentModel<B>> {
        let path = self.model_path();
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Checkpoint not found: {}",
                path.display()
            )));
        }

        let bytes = fs::read(&path)?;
        let record = Recorder::<B>::load(&Self::recorder(), bytes, device)
            .map_err(|e| Error::Checkpoint(format!("Failed to load {}: {e}", path.display())))?;

        info!("Checkpoint loaded from {}", path.display());
        Ok(model.load_record(record))
    }

    pub fn load_metadata(&self) -> Result<CheckpointMetadata> {
        let path = self.metadata_path();
        let json = fs::read_to_string(&path)?;
        let metadata = serde_json::from_str(&json).map_err(|e| {
            Error::Serialization(format!("Failed to read {}: {e}", path.display()))
        })?;
        Ok(metadata)
    }
}

//! Configuration structures for the multi-label benchmark.

use crate::cli::{load_toml_config, ExperimentArgs};
use crate::types::{LossKind, ModelKind, OptimizerKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest accepted seed; TOML cannot store larger integers
pub const MAX_SEED: u64 = i64::MAX as u64;

/// Complete configuration of one benchmark run.
///
/// Built once from the command line (optionally layered over a TOML file)
/// and passed by reference to everything that needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Training hyperparameters
    pub training: TrainingParams,
    /// Data configuration
    pub data: DataConfig,
    /// Output configuration
    pub output: OutputConfig,
    /// Device configuration
    pub device: DeviceConfig,
    /// Models to train, in bank order
    pub models: Vec<ModelKind>,
    /// Random seed for splitting and augmentation
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            training: TrainingParams::default(),
            data: DataConfig::default(),
            output: OutputConfig::default(),
            device: DeviceConfig::default(),
            models: ModelKind::ALL.to_vec(),
            seed: 42,
        }
    }
}

impl ExperimentConfig {
    /// Builds the configuration from parsed command line arguments.
    ///
    /// Values from `--config` are loaded first; every flag that was given
    /// overrides the corresponding file value.
    pub fn from_args(args: &ExperimentArgs) -> Result<Self> {
        let mut config: ExperimentConfig = match &args.config {
            Some(path) => load_toml_config(path)?,
            None => ExperimentConfig::default(),
        };

        if let Some(batch_size) = args.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(epochs) = args.epochs {
            config.training.epochs = epochs;
        }
        if let Some(lr) = args.lr {
            config.training.learning_rate = lr;
        }
        if let Some(name) = &args.opt {
            config.training.optimizer = OptimizerKind::from_name(name)?;
        }
        if let Some(weight_decay) = args.weight_decay {
            config.training.weight_decay = Some(weight_decay);
        }
        if let Some(name) = &args.loss {
            let loss = LossKind::from_name(name)?;
            if loss != config.training.loss {
                // File parameters belong to the previous loss
                config.training.loss_params = None;
            }
            config.training.loss = loss;
        }
        if let Some(raw) = &args.loss_param {
            config.training.loss_params = LossParams::parse(config.training.loss, raw)?;
        }
        if let Some(patience) = args.patience {
            config.training.patience = Some(patience);
        }
        if let Some(path) = &args.path {
            config.output.path = path.clone();
        }
        if let Some(data_dir) = &args.data_dir {
            config.data.data_dir = data_dir.clone();
        }
        if let Some(fraction) = args.test_fraction {
            config.data.test_fraction = fraction;
        }
        if args.no_eval_augmentation {
            config.data.augment_eval = false;
        }
        if let Some(workers) = args.num_workers {
            config.data.num_workers = workers;
        }
        if let Some(seed) = args.seed {
            config.seed = seed;
        }
        if let Some(list) = &args.models {
            config.models = ModelKind::parse_list(list)?;
        }
        if let Some(index) = args.device_index {
            config.device.index = index;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges and the loss/parameter pairing
    pub fn validate(&self) -> Result<()> {
        let t = &self.training;
        if t.batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be at least 1".into()));
        }
        if t.epochs == 0 {
            return Err(Error::InvalidArgument("epoch count must be at least 1".into()));
        }
        if !(t.learning_rate.is_finite() && t.learning_rate > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "learning rate must be positive, got {}",
                t.learning_rate
            )));
        }
        if let Some(wd) = t.weight_decay {
            if !(wd.is_finite() && wd >= 0.0) {
                return Err(Error::InvalidArgument(format!(
                    "weight decay must be non-negative, got {wd}"
                )));
            }
        }
        if t.patience == Some(0) {
            return Err(Error::InvalidArgument("patience must be at least 1".into()));
        }
        if let Some(params) = &t.loss_params {
            params.check_kind(t.loss)?;
            params.validate()?;
        }

        let fraction = self.data.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(Error::InvalidArgument(format!(
                "test fraction must lie in (0, 1), got {fraction}"
            )));
        }
        if self.data.image_size == 0 {
            return Err(Error::InvalidArgument("image size must be at least 1".into()));
        }
        if self.models.is_empty() {
            return Err(Error::InvalidArgument("no models selected".into()));
        }
        // The effective config is saved as TOML, whose integers are i64
        if self.seed > MAX_SEED {
            return Err(Error::InvalidArgument(format!(
                "seed must be at most {MAX_SEED}, got {}",
                self.seed
            )));
        }
        Ok(())
    }

    /// Loss parameters to use, falling back to the defaults of the selected loss
    pub fn effective_loss_params(&self) -> LossParams {
        self.training
            .loss_params
            .clone()
            .unwrap_or_else(|| LossParams::defaults_for(self.training.loss))
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Batch size
    pub batch_size: usize,
    /// Number of training epochs
    pub epochs: usize,
    /// Learning rate
    pub learning_rate: f64,
    /// Optimizer type
    pub optimizer: OptimizerKind,
    /// Weight decay applied by the optimizer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_decay: Option<f64>,
    /// Loss function
    pub loss: LossKind,
    /// Loss parameters, `None` means the defaults of `loss`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_params: Option<LossParams>,
    /// Early stopping patience (epochs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patience: Option<usize>,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            batch_size: 4,
            epochs: 100,
            learning_rate: 1e-5,
            optimizer: OptimizerKind::Adam,
            weight_decay: None,
            loss: LossKind::Bce,
            loss_params: None,
            patience: None,
        }
    }
}

/// Data configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root directory of the dataset
    pub data_dir: PathBuf,
    /// Manifest file name inside `data_dir`
    pub manifest: String,
    /// Fraction of unsplit samples assigned to the test set
    pub test_fraction: f64,
    /// Side length of the square model input
    pub image_size: usize,
    /// Maximum absolute rotation applied to images, in degrees
    pub rotation_degrees: f32,
    /// Apply the random rotation to test images as well as training images
    pub augment_eval: bool,
    /// Number of data loader workers
    pub num_workers: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            manifest: "annotations.json".to_string(),
            test_fraction: 0.2,
            image_size: 256,
            rotation_degrees: 30.0,
            augment_eval: true,
            num_workers: 1,
        }
    }
}

impl DataConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join(&self.manifest)
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving checkpoints and reports
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("multi_label_output"),
        }
    }
}

/// Device configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Index of the accelerator to use
    pub index: usize,
}

/// Typed loss parameters.
///
/// On the command line these are given as a JSON object whose fields must
/// belong to the selected loss, e.g. `{"gamma": 1.5}` for `focal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossParams {
    Bce(BceParams),
    Focal(FocalParams),
    Asl(AslParams),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BceParams {
    /// Per-class weights applied to the element-wise loss
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f32>>,
    /// Label smoothing factor in `[0, 1]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FocalParams {
    pub gamma: f32,
    pub alpha: f32,
}

impl Default for FocalParams {
    fn default() -> Self {
        Self {
            gamma: 2.0,
            alpha: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AslParams {
    pub gamma_pos: f32,
    pub gamma_neg: f32,
    /// Probability margin shifted off negatives
    pub clip: f32,
}

impl Default for AslParams {
    fn default() -> Self {
        Self {
            gamma_pos: 0.0,
            gamma_neg: 4.0,
            clip: 0.05,
        }
    }
}

impl LossParams {
    /// Parses the `--loss-param` value for the given loss.
    ///
    /// The literal `None` (or an empty string) means no parameters.
    pub fn parse(kind: LossKind, raw: &str) -> Result<Option<Self>> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
            return Ok(None);
        }

        let invalid = |e: serde_json::Error| Error::InvalidLossParams(format!("{kind}: {e}"));
        let params = match kind {
            LossKind::Bce => LossParams::Bce(serde_json::from_str(raw).map_err(invalid)?),
            LossKind::Focal => LossParams::Focal(serde_json::from_str(raw).map_err(invalid)?),
            LossKind::Asl => LossParams::Asl(serde_json::from_str(raw).map_err(invalid)?),
        };
        params.validate()?;
        Ok(Some(params))
    }

    pub fn defaults_for(kind: LossKind) -> Self {
        match kind {
            LossKind::Bce => LossParams::Bce(BceParams::default()),
            LossKind::Focal => LossParams::Focal(FocalParams::default()),
            LossKind::Asl => LossParams::Asl(AslParams::default()),
        }
    }

    pub fn kind(&self) -> LossKind {
        match self {
            LossParams::Bce(_) => LossKind::Bce,
            LossParams::Focal(_) => LossKind::Focal,
            LossParams::Asl(_) => LossKind::Asl,
        }
    }

    pub fn check_kind(&self, kind: LossKind) -> Result<()> {
        if self.kind() != kind {
            return Err(Error::InvalidLossParams(format!(
                "parameters for {} given with loss {kind}",
                self.kind()
            )));
        }
        Ok(())
    }

    /// Range checks that do not depend on the dataset
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::InvalidLossParams(msg));
        match self {
            LossParams::Bce(p) => {
                if let Some(s) = p.smoothing {
                    if !(0.0..=1.0).contains(&s) {
                        return fail(format!("smoothing must lie in [0, 1], got {s}"));
                    }
                }
                if let Some(w) = &p.weights {
                    if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
                        return fail("weights must be finite and non-negative".into());
                    }
                }
            }
            LossParams::Focal(p) => {
                if p.gamma < 0.0 {
                    return fail(format!("gamma must be non-negative, got {}", p.gamma));
                }
                if !(0.0..=1.0).contains(&p.alpha) {
                    return fail(format!("alpha must lie in [0, 1], got {}", p.alpha));
                }
            }
            LossParams::Asl(p) => {
                if p.gamma_pos < 0.0 || p.gamma_neg < 0.0 {
                    return fail("focusing exponents must be non-negative".into());
                }
                if !(0.0..1.0).contains(&p.clip) {
                    return fail(format!("clip must lie in [0, 1), got {}", p.clip));
                }
            }
        }
        Ok(())
    }

    /// Checks that per-class weights, if any, cover every class
    pub fn validate_for_classes(&self, num_classes: usize) -> Result<()> {
        if let LossParams::Bce(BceParams {
            weights: Some(weights),
            ..
        }) = self
        {
            if weights.len() != num_classes {
                return Err(Error::InvalidLossParams(format!(
                    "{} weights given for {num_classes} classes",
                    weights.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(flags: &[&str]) -> ExperimentArgs {
        let mut argv = vec!["experiment-runner"];
        argv.extend_from_slice(flags);
        ExperimentArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ExperimentConfig::from_args(&args(&[])).unwrap();
        assert_eq!(config.training.batch_size, 4);
        assert_eq!(config.training.epochs, 100);
        assert_eq!(config.training.learning_rate, 1e-5);
        assert_eq!(config.training.optimizer, OptimizerKind::Adam);
        assert_eq!(config.training.loss, LossKind::Bce);
        assert_eq!(config.training.loss_params, None);
        assert_eq!(config.output.path, PathBuf::from("multi_label_output"));
        assert_eq!(config.models, ModelKind::ALL.to_vec());
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = ExperimentConfig::from_args(&args(&[
            "--batch-size",
            "16",
            "--epochs",
            "3",
            "--lr",
            "0.001",
            "--opt",
            "sgd",
            "--loss",
            "focal",
            "--loss-param",
            r#"{"gamma": 1.5}"#,
            "--path",
            "runs/a",
            "--models",
            "effnet,resnet",
        ]))
        .unwrap();

        assert_eq!(config.training.batch_size, 16);
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.optimizer, OptimizerKind::Sgd);
        assert_eq!(
            config.training.loss_params,
            Some(LossParams::Focal(FocalParams {
                gamma: 1.5,
                alpha: 0.25
            }))
        );
        assert_eq!(config.output.path, PathBuf::from("runs/a"));
        assert_eq!(config.models, vec![ModelKind::ResNet, ModelKind::EfficientNet]);
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        assert!(matches!(
            ExperimentConfig::from_args(&args(&["--opt", "lbfgs"])),
            Err(Error::UnsupportedOptimizer(_))
        ));
        assert!(matches!(
            ExperimentConfig::from_args(&args(&["--loss", "hinge"])),
            Err(Error::UnsupportedLoss(_))
        ));
    }

    #[test]
    fn test_loss_param_literal_none() {
        assert_eq!(LossParams::parse(LossKind::Asl, "None").unwrap(), None);
        assert_eq!(LossParams::parse(LossKind::Bce, "  ").unwrap(), None);
    }

    #[test]
    fn test_loss_param_rejects_foreign_fields() {
        let err = LossParams::parse(LossKind::Bce, r#"{"gamma": 2.0}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidLossParams(_)));

        let err = LossParams::parse(LossKind::Focal, "gamma=2").unwrap_err();
        assert!(matches!(err, Error::InvalidLossParams(_)));
    }

    #[test]
    fn test_loss_param_ranges() {
        assert!(LossParams::parse(LossKind::Focal, r#"{"alpha": 1.5}"#).is_err());
        assert!(LossParams::parse(LossKind::Asl, r#"{"clip": 1.0}"#).is_err());
        assert!(LossParams::parse(LossKind::Bce, r#"{"smoothing": 0.1}"#).is_ok());
    }

    #[test]
    fn test_bce_weights_must_match_classes() {
        let params = LossParams::parse(LossKind::Bce, r#"{"weights": [1.0, 2.0]}"#)
            .unwrap()
            .unwrap();
        assert!(params.validate_for_classes(2).is_ok());
        assert!(params.validate_for_classes(3).is_err());
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        assert!(ExperimentConfig::from_args(&args(&["--batch-size", "0"])).is_err());
        assert!(ExperimentConfig::from_args(&args(&["--test-fraction", "1.0"])).is_err());
        assert!(ExperimentConfig::from_args(&args(&["--lr", "0"])).is_err());
    }

    #[test]
    fn test_seed_must_fit_in_toml() {
        let err = ExperimentConfig::from_args(&args(&["--seed", "18446744073709551615"]));
        assert!(matches!(err, Err(Error::InvalidArgument(_))));

        let max = MAX_SEED.to_string();
        let config = ExperimentConfig::from_args(&args(&["--seed", &max])).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.toml");
        crate::cli::save_toml_config(&config, &path).unwrap();
        let loaded: ExperimentConfig = crate::cli::load_toml_config(&path).unwrap();
        assert_eq!(loaded.seed, MAX_SEED);
    }

    #[test]
    fn test_eval_augmentation_flag() {
        assert!(ExperimentConfig::default().data.augment_eval);
        let config = ExperimentConfig::from_args(&args(&["--no-eval-augmentation"])).unwrap();
        assert!(!config.data.augment_eval);
    }

    #[test]
    fn test_mismatched_params_rejected() {
        let mut config = ExperimentConfig::default();
        config.training.loss_params = Some(LossParams::defaults_for(LossKind::Asl));
        assert!(matches!(config.validate(), Err(Error::InvalidLossParams(_))));
    }

    #[test]
    fn test_toml_round_trip_with_cli_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.toml");

        let mut base = ExperimentConfig::default();
        base.training.epochs = 7;
        base.training.loss = LossKind::Asl;
        base.training.loss_params = Some(LossParams::defaults_for(LossKind::Asl));
        crate::cli::save_toml_config(&base, &path).unwrap();

        let config_flag = path.to_string_lossy().to_string();
        let config =
            ExperimentConfig::from_args(&args(&["--config", &config_flag, "--batch-size", "2"]))
                .unwrap();
        assert_eq!(config.training.epochs, 7);
        assert_eq!(config.training.batch_size, 2);
        assert_eq!(config.training.loss, LossKind::Asl);
        assert_eq!(config.effective_loss_params(), LossParams::defaults_for(LossKind::Asl));
    }
}

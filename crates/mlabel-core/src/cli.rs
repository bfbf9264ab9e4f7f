//! Shared CLI helpers for workspace tools.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{Error, Result};

/// Command line of the experiment runner.
///
/// Every value is optional so that a `--config` file can provide it; unset
/// values fall back to `ExperimentConfig::default()`.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "experiment-runner")]
#[command(about = "Train the multi-label model bank on one dataset and compare the results")]
pub struct ExperimentArgs {
    /// Batch size for training and evaluation [default: 4]
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Number of epochs per model [default: 100]
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Learning rate [default: 1e-5]
    #[arg(long)]
    pub lr: Option<f64>,

    /// Output directory for checkpoints and reports [default: multi_label_output]
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Optimizer: adam, adamw, sgd or rmsprop [default: adam]
    #[arg(long)]
    pub opt: Option<String>,

    /// Loss: bce, focal or asl [default: bce]
    #[arg(long)]
    pub loss: Option<String>,

    /// Loss parameters as a JSON object, or None [default: None]
    #[arg(long)]
    pub loss_param: Option<String>,

    /// Optimizer weight decay
    #[arg(long)]
    pub weight_decay: Option<f64>,

    /// Dataset directory containing annotations.json [default: data]
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Fraction of unsplit samples used for testing [default: 0.2]
    #[arg(long)]
    pub test_fraction: Option<f64>,

    /// Random seed [default: 42]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Comma separated subset of resnet,resnet_modified,effnet,transformer
    #[arg(long)]
    pub models: Option<String>,

    /// Accelerator index [default: 0]
    #[arg(long)]
    pub device_index: Option<usize>,

    /// Data loader worker threads [default: 1]
    #[arg(long)]
    pub num_workers: Option<usize>,

    /// Evaluate on unrotated test images
    #[arg(long)]
    pub no_eval_augmentation: bool,

    /// Stop a model after this many epochs without improvement
    #[arg(long)]
    pub patience: Option<usize>,

    /// TOML file with an ExperimentConfig
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn setup_cli_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
}

pub fn save_toml_config<T>(value: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    let content = toml::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}

/// Creates the output directory if it is missing.
///
/// Returns `true` when the directory was created by this call.
pub fn ensure_output_dir(path: &Path) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    if path.exists() {
        return Err(Error::InvalidArgument(format!(
            "output path {} exists and is not a directory",
            path.display()
        )));
    }
    fs::create_dir_all(path)?;
    tracing::info!("Created output directory {}", path.display());
    Ok(true)
}

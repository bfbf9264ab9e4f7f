//! Dataset manifest loading and train/test splitting.
//!
//! A dataset directory holds an `annotations.json` manifest:
//!
//! ```json
//! {
//!   "classes": ["cat", "dog", "bird"],
//!   "samples": [
//!     { "image": "img/0001.png", "labels": ["cat", "bird"], "split": "train" },
//!     { "image": "img/0002.png", "labels": [] }
//!   ]
//! }
//! ```
//!
//! Samples without a `split` are divided between train and test by a seeded
//! shuffle.

use mlabel_core::{DataSplit, Error, LabeledImage, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Parsed `annotations.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetManifest {
    /// Ordered class names; the index is the label position
    pub classes: Vec<String>,
    pub samples: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// Image path relative to the dataset directory
    pub image: PathBuf,
    /// Names of the classes present in the image
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<DataSplit>,
}

/// Resolved train and test samples with absolute image paths
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub classes: Vec<String>,
    pub train: Vec<LabeledImage>,
    pub test: Vec<LabeledImage>,
}

impl DatasetSplit {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Number of positive labels per class in the given samples
    pub fn label_counts(samples: &[LabeledImage], num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for sample in samples {
            for (class, &label) in sample.labels.iter().enumerate().take(num_classes) {
                counts[class] += label as usize;
            }
        }
        counts
    }
}

impl DatasetManifest {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Dataset manifest not found: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Dataset(format!("Failed to parse manifest {}: {e}", path.display()))
        })
    }

    fn class_index(&self) -> Result<HashMap<&str, usize>> {
        if self.classes.is_empty() {
            return Err(Error::Dataset("manifest lists no classes".to_string()));
        }
        let mut index = HashMap::with_capacity(self.classes.len());
        for (i, name) in self.classes.iter().enumerate() {
            if index.insert(name.as_str(), i).is_some() {
                return Err(Error::Dataset(format!("duplicate class name: {name}")));
            }
        }
        Ok(index)
    }

    /// Resolves labels and paths, then splits the samples.
    ///
    /// Explicitly split samples keep their split. The rest are shuffled with
    /// `seed` and `round(test_fraction * n)` of them go to the test set.
    pub fn resolve(&self, data_dir: &Path, test_fraction: f64, seed: u64) -> Result<DatasetSplit> {
        let index = self.class_index()?;
        let num_classes = self.classes.len();

        let mut train = Vec::new();
        let mut test = Vec::new();
        let mut unsplit = Vec::new();

        for entry in &self.samples {
            let mut positives = Vec::with_capacity(entry.labels.len());
            for label in &entry.labels {
                let class = index.get(label.as_str()).ok_or_else(|| {
                    Error::Dataset(format!(
                        "image {} has unknown label {label}",
                        entry.image.display()
                    ))
                })?;
                positives.push(*class);
            }

            let path = if entry.image.is_absolute() {
                entry.image.clone()
            } else {
                data_dir.join(&entry.image)
            };
            if !path.exists() {
                return Err(Error::NotFound(format!(
                    "Image file not found: {}",
                    path.display()
                )));
            }

            let sample = LabeledImage::from_indices(path, &positives, num_classes);
            match entry.split {
                Some(DataSplit::Train) => train.push(sample),
                Some(DataSplit::Test) => test.push(sample),
                None => unsplit.push(sample),
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        unsplit.shuffle(&mut rng);
        let n_test = test_count(unsplit.len(), test_fraction);
        let rest = unsplit.split_off(n_test);
        test.extend(unsplit);
        train.extend(rest);

        if train.is_empty() {
            return Err(Error::Dataset("training split is empty".to_string()));
        }
        if test.is_empty() {
            return Err(Error::Dataset("test split is empty".to_string()));
        }

        Ok(DatasetSplit {
            classes: self.classes.clone(),
            train,
            test,
        })
    }
}

/// Test share of `n` unsplit samples, leaving at least one on each side when `n >= 2`
fn test_count(n: usize, fraction: f64) -> usize {
    let raw = (n as f64 * fraction).round() as usize;
    if n >= 2 {
        raw.clamp(1, n - 1)
    } else {
        raw.min(n)
    }
}

/// Loads `<data_dir>/<manifest>` and splits it
pub fn load_dataset_split(
    data_dir: &Path,
    manifest: &str,
    test_fraction: f64,
    seed: u64,
) -> Result<DatasetSplit> {
    let manifest = DatasetManifest::load(&data_dir.join(manifest))?;
    let split = manifest.resolve(data_dir, test_fraction, seed)?;
    tracing::info!(
        "Dataset: {} classes, {} train / {} test images",
        split.num_classes(),
        split.train.len(),
        split.test.len()
    );
    Ok(split)
}

//! Burn dataset and batcher for multi-label images.
//!
//! - `MultiLabelBatcher::new`: no augmentation
//! - `MultiLabelBatcher::with_rotation`: random rotation per image, used by the
//!   train loader and, unless disabled, by the test loader

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::GrayImage;
use indicatif::{ProgressBar, ProgressStyle};
use mlabel_core::{DataConfig, LabeledImage, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::augmentation::RandomRotation;
use crate::loader::{load_dataset_split, DatasetSplit};
use crate::preprocess::{ImagePreprocessor, PreprocessConfig};

/// One preprocessed image with its multi-hot labels.
///
/// The image is stored resized and cropped as 8-bit luma; conversion to
/// normalized floats happens in the batcher, after augmentation.
#[derive(Clone, Debug)]
pub struct MultiLabelItem {
    pub image: GrayImage,
    pub labels: Vec<u8>,
    pub path: PathBuf,
}

/// In-memory dataset of preprocessed items
#[derive(Clone)]
pub struct MultiLabelDataset {
    items: Vec<MultiLabelItem>,
}

impl std::fmt::Debug for MultiLabelDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiLabelDataset")
            .field("len", &self.items.len())
            .finish()
    }
}

impl MultiLabelDataset {
    /// Decodes and preprocesses every sample up front.
    ///
    /// Any unreadable image fails the whole load.
    pub fn load(
        samples: &[LabeledImage],
        preprocessor: &ImagePreprocessor,
        name: &str,
    ) -> Result<Self> {
        let pb = ProgressBar::new(samples.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(name.to_string());

        let mut items = Vec::with_capacity(samples.len());
        for sample in samples {
            let image = preprocessor.load(&sample.path)?;
            items.push(MultiLabelItem {
                image,
                labels: sample.labels.clone(),
                path: sample.path.clone(),
            });
            pb.inc(1);
        }
        pb.finish_and_clear();

        tracing::debug!("Loaded {} {name} images", items.len());
        Ok(Self { items })
    }

    pub fn from_items(items: Vec<MultiLabelItem>) -> Self {
        Self { items }
    }
}

impl Dataset<MultiLabelItem> for MultiLabelDataset {
    fn get(&self, index: usize) -> Option<MultiLabelItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of images and multi-hot targets
#[derive(Clone, Debug)]
pub struct MultiLabelBatch<B: Backend> {
    /// Shape `[batch_size, 1, height, width]`
    pub images: Tensor<B, 4>,
    /// Shape `[batch_size, num_classes]`, values in {0, 1}
    pub targets: Tensor<B, 2, Int>,
}

/// Batcher turning items into normalized tensors
#[derive(Clone, Debug)]
pub struct MultiLabelBatcher {
    preprocessor: ImagePreprocessor,
    num_classes: usize,
    rotation: Option<RandomRotation>,
    seed: u64,
    /// Shared across clones so every batch draws fresh angles
    batches_seen: Arc<AtomicU64>,
}

impl MultiLabelBatcher {
    /// Batcher without augmentation
    pub fn new(config: PreprocessConfig, num_classes: usize) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(config),
            num_classes,
            rotation: None,
            seed: 0,
            batches_seen: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Rotates every image by a random angle, fresh for each batch
    pub fn with_rotation(mut self, rotation: RandomRotation, seed: u64) -> Self {
        self.rotation = Some(rotation);
        self.seed = seed;
        self
    }

    fn batch_rng(&self) -> ChaCha8Rng {
        let n = self.batches_seen.fetch_add(1, Ordering::Relaxed);
        ChaCha8Rng::seed_from_u64(self.seed ^ n.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

impl<B: Backend> Batcher<B, MultiLabelItem, MultiLabelBatch<B>> for MultiLabelBatcher {
    fn batch(&self, items: Vec<MultiLabelItem>, device: &B::Device) -> MultiLabelBatch<B> {
        let batch_size = items.len();
        let size = self.preprocessor.image_size();

        let mut images_data = Vec::with_capacity(batch_size * size * size);
        let mut targets_data = Vec::with_capacity(batch_size * self.num_classes);
        let mut rng = self.rotation.map(|_| self.batch_rng());

        for item in &items {
            let mut pixels = match (&self.rotation, rng.as_mut()) {
                (Some(rotation), Some(rng)) => {
                    ImagePreprocessor::to_unit_floats(&rotation.apply(&item.image, rng))
                }
                _ => ImagePreprocessor::to_unit_floats(&item.image),
            };
            self.preprocessor.normalize(&mut pixels);
            images_data.extend(pixels);
            targets_data.extend(
                (0..self.num_classes).map(|c| item.labels.get(c).copied().unwrap_or(0) as i64),
            );
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 1, size, size]),
            device,
        );

        let targets = Tensor::<B, 2, Int>::from_data(
            TensorData::new(targets_data, [batch_size, self.num_classes]),
            device,
        );

        MultiLabelBatch { images, targets }
    }
}

pub type MultiLabelLoader<B> = Arc<dyn DataLoader<B, MultiLabelBatch<B>>>;

/// Train and test datasets plus what is needed to batch them
#[derive(Debug, Clone)]
pub struct MultiLabelData {
    pub classes: Vec<String>,
    pub train: MultiLabelDataset,
    pub test: MultiLabelDataset,
    pub preprocess: PreprocessConfig,
    pub rotation: RandomRotation,
    /// Rotate test images as well
    pub augment_eval: bool,
}

impl MultiLabelData {
    /// Reads the manifest, splits it and preprocesses every image
    pub fn load(config: &DataConfig, seed: u64) -> Result<Self> {
        let split =
            load_dataset_split(&config.data_dir, &config.manifest, config.test_fraction, seed)?;
        Self::from_split(&split, config)
    }

    pub fn from_split(split: &DatasetSplit, config: &DataConfig) -> Result<Self> {
        let preprocess = PreprocessConfig::default().with_image_size(config.image_size as u32);
        let preprocessor = ImagePreprocessor::new(preprocess.clone());
        let num_classes = split.num_classes();

        let train_counts = DatasetSplit::label_counts(&split.train, num_classes);
        let test_counts = DatasetSplit::label_counts(&split.test, num_classes);
        let counts = train_counts.iter().zip(&test_counts);
        for (class, (train, test)) in split.classes.iter().zip(counts) {
            info!("  {class}: {train} train / {test} test positives");
        }

        let train = MultiLabelDataset::load(&split.train, &preprocessor, "train")?;
        let test = MultiLabelDataset::load(&split.test, &preprocessor, "test")?;

        Ok(Self {
            classes: split.classes.clone(),
            train,
            test,
            preprocess,
            rotation: RandomRotation::new(config.rotation_degrees),
            augment_eval: config.augment_eval,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Shuffled, augmented loader over the training set
    pub fn train_loader<B: Backend>(
        &self,
        batch_size: usize,
        num_workers: usize,
        seed: u64,
        device: &B::Device,
    ) -> MultiLabelLoader<B> {
        let batcher = MultiLabelBatcher::new(self.preprocess.clone(), self.num_classes())
            .with_rotation(self.rotation, seed);
        DataLoaderBuilder::<B, MultiLabelItem, MultiLabelBatch<B>>::new(batcher)
            .batch_size(batch_size)
            .shuffle(seed)
            .num_workers(num_workers.max(1))
            .set_device(device.clone())
            .build(self.train.clone())
    }

    /// Loader over the test set in manifest order.
    ///
    /// Test images are rotated too when `augment_eval` is set, with a stream
    /// separate from the train loader's.
    pub fn test_loader<B: Backend>(
        &self,
        batch_size: usize,
        num_workers: usize,
        seed: u64,
        device: &B::Device,
    ) -> MultiLabelLoader<B> {
        let mut batcher = MultiLabelBatcher::new(self.preprocess.clone(), self.num_classes());
        if self.augment_eval {
            batcher = batcher.with_rotation(self.rotation, seed.wrapping_add(1));
        }
        DataLoaderBuilder::<B, MultiLabelItem, MultiLabelBatch<B>>::new(batcher)
            .batch_size(batch_size)
            .num_workers(num_workers.max(1))
            .set_device(device.clone())
            .build(self.test.clone())
    }
}

//! Multi-label dataset loading, preprocessing and batching.
//!
//! This crate reads an `annotations.json` manifest, splits it into train and
//! test sets, preprocesses images into square single-channel inputs and
//! provides Burn data loaders over them.

pub mod augmentation;
pub mod dataset;
pub mod loader;
pub mod preprocess;

pub use augmentation::RandomRotation;
pub use dataset::{
    MultiLabelBatch, MultiLabelBatcher, MultiLabelData, MultiLabelDataset, MultiLabelItem,
    MultiLabelLoader,
};
pub use loader::{load_dataset_split, DatasetManifest, DatasetSplit, ManifestEntry};
pub use preprocess::{ImagePreprocessor, PreprocessConfig};

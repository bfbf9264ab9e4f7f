//! Core type definitions for the multi-label benchmark.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Result};

/// One labeled image as listed in the dataset manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabeledImage {
    /// Path to the image file
    pub path: PathBuf,
    /// Multi-hot label vector, one entry per class
    pub labels: Vec<u8>,
}

impl LabeledImage {
    /// Creates a labeled image from the indices of its positive classes
    pub fn from_indices(path: PathBuf, positives: &[usize], num_classes: usize) -> Self {
        let mut labels = vec![0u8; num_classes];
        for &idx in positives {
            if idx < num_classes {
                labels[idx] = 1;
            }
        }
        Self { path, labels }
    }
}

/// Data split type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataSplit {
    Train,
    Test,
}

impl fmt::Display for DataSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSplit::Train => write!(f, "train"),
            DataSplit::Test => write!(f, "test"),
        }
    }
}

/// The four architectures of the model bank.
///
/// The declaration order is the order in which the driver trains them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelKind {
    /// ResNet-34 with a single-channel 7x7 stem
    #[serde(rename = "resnet")]
    ResNet,
    /// ResNet-34 with a 3x3 stride-1 stem and no stem max-pool
    #[serde(rename = "resnet_modified")]
    ResNetModified,
    /// EfficientNet-B0 with a single-channel stem
    #[serde(rename = "effnet")]
    EfficientNet,
    /// Vision Transformer over 8x8 patches
    #[serde(rename = "transformer")]
    Transformer,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::ResNet,
        ModelKind::ResNetModified,
        ModelKind::EfficientNet,
        ModelKind::Transformer,
    ];

    /// Name used on the command line and for checkpoint files
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::ResNet => "resnet",
            ModelKind::ResNetModified => "resnet_modified",
            ModelKind::EfficientNet => "effnet",
            ModelKind::Transformer => "transformer",
        }
    }

    /// Parses a comma separated model list, keeping bank order and dropping duplicates
    pub fn parse_list(list: &str) -> Result<Vec<ModelKind>> {
        let mut kinds = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let kind: ModelKind = part.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        if kinds.is_empty() {
            return Err(Error::InvalidArgument("model list is empty".to_string()));
        }
        kinds.sort();
        Ok(kinds)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ModelKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| Error::UnsupportedModel(s.to_string()))
    }
}

/// Optimizer type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
    RmsProp,
}

impl OptimizerKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "adamw" => Ok(OptimizerKind::AdamW),
            "sgd" => Ok(OptimizerKind::Sgd),
            "rmsprop" => Ok(OptimizerKind::RmsProp),
            _ => Err(Error::UnsupportedOptimizer(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::Adam => "adam",
            OptimizerKind::AdamW => "adamw",
            OptimizerKind::Sgd => "sgd",
            OptimizerKind::RmsProp => "rmsprop",
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Multi-label loss type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    /// Binary cross-entropy on logits
    Bce,
    /// Sigmoid focal loss
    Focal,
    /// Asymmetric loss
    Asl,
}

impl LossKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bce" => Ok(LossKind::Bce),
            "focal" => Ok(LossKind::Focal),
            "asl" => Ok(LossKind::Asl),
            _ => Err(Error::UnsupportedLoss(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LossKind::Bce => "bce",
            LossKind::Focal => "focal",
            LossKind::Asl => "asl",
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_order_and_names() {
        let names: Vec<_> = ModelKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names, ["resnet", "resnet_modified", "effnet", "transformer"]);
    }

    #[test]
    fn test_model_kind_from_str() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
        assert!(matches!(
            "vgg".parse::<ModelKind>(),
            Err(Error::UnsupportedModel(_))
        ));
    }

    #[test]
    fn test_model_list_keeps_bank_order() {
        let kinds = ModelKind::parse_list("transformer, resnet,resnet").unwrap();
        assert_eq!(kinds, vec![ModelKind::ResNet, ModelKind::Transformer]);
        assert!(ModelKind::parse_list(" , ").is_err());
    }

    #[test]
    fn test_model_kind_serde_uses_cli_names() {
        let json = serde_json::to_string(&ModelKind::ResNetModified).unwrap();
        assert_eq!(json, "\"resnet_modified\"");
    }

    #[test]
    fn test_optimizer_names() {
        for name in ["adam", "adamw", "sgd", "rmsprop"] {
            assert_eq!(OptimizerKind::from_name(name).unwrap().name(), name);
        }
        assert_eq!(OptimizerKind::from_name("Adam").unwrap(), OptimizerKind::Adam);
        assert!(matches!(
            OptimizerKind::from_name("lbfgs"),
            Err(Error::UnsupportedOptimizer(_))
        ));
    }

    #[test]
    fn test_loss_names() {
        for name in ["bce", "focal", "asl"] {
            assert_eq!(LossKind::from_name(name).unwrap().name(), name);
        }
        assert!(matches!(LossKind::from_name("hinge"), Err(Error::UnsupportedLoss(_))));
    }

    #[test]
    fn test_labeled_image_from_indices() {
        let sample = LabeledImage::from_indices(PathBuf::from("a.png"), &[0, 2, 7], 4);
        assert_eq!(sample.labels, vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_data_split_display() {
        assert_eq!(DataSplit::Train.to_string(), "train");
        assert_eq!(DataSplit::Test.to_string(), "test");
    }
}

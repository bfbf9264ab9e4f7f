//! Model bank for multi-label classification.
//!
//! Implements:
//! - ResNet-34 with the standard 7x7 stem (`resnet`)
//! - ResNet-34 with a 3x3 stride-1 stem and no stem pooling (`resnet_modified`)
//! - EfficientNet-B0 (`effnet`)
//! - Vision Transformer over 8x8 patches (`transformer`)
//!
//! All take `[batch, 1, H, W]` images and return `[batch, num_classes]` logits.

pub mod efficientnet;
pub mod resnet;
pub mod vit;

use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use mlabel_core::{Error, ModelKind, Result};

pub use efficientnet::EfficientNetB0;
pub use resnet::{ResNet34, StemConfig};
pub use vit::{VisionTransformer, VitConfig};

/// Default square input size
pub const DEFAULT_IMAGE_SIZE: usize = 256;

/// Unified classifier over the four architectures
#[derive(Module, Debug)]
pub struct ExperimentModel<B: Backend> {
    network: Network<B>,
    num_classes: usize,
}

#[derive(Module, Debug)]
pub enum Network<B: Backend> {
    ResNet(ResNet34<B>),
    ResNetModified(ResNet34<B>),
    EfficientNet(EfficientNetB0<B>),
    Transformer(VisionTransformer<B>),
}

impl<B: Backend> ExperimentModel<B> {
    /// Builds a freshly initialised model for 256x256 input
    pub fn new(kind: ModelKind, num_classes: usize, device: &B::Device) -> Self {
        Self::build(kind, num_classes, &VitConfig::default(), device)
    }

    /// Builds a model for `image_size` x `image_size` input.
    ///
    /// Only the transformer depends on the input size; it needs a multiple
    /// of the patch size.
    pub fn for_image_size(
        kind: ModelKind,
        num_classes: usize,
        image_size: usize,
        device: &B::Device,
    ) -> Result<Self> {
        if num_classes == 0 {
            return Err(Error::Model("a classifier needs at least one class".to_string()));
        }
        let vit = VitConfig::default().with_image_size(image_size);
        if kind == ModelKind::Transformer {
            vit.validate()?;
        }
        Ok(Self::build(kind, num_classes, &vit, device))
    }

    fn build(kind: ModelKind, num_classes: usize, vit: &VitConfig, device: &B::Device) -> Self {
        let network = match kind {
            ModelKind::ResNet => {
                Network::ResNet(ResNet34::new(StemConfig::standard(), num_classes, device))
            }
            ModelKind::ResNetModified => {
                Network::ResNetModified(ResNet34::new(StemConfig::modified(), num_classes, device))
            }
            ModelKind::EfficientNet => {
                Network::EfficientNet(EfficientNetB0::new(num_classes, device))
            }
            ModelKind::Transformer => {
                Network::Transformer(VisionTransformer::new(vit, num_classes, device))
            }
        };

        Self {
            network,
            num_classes,
        }
    }

    /// Forward pass returning raw logits
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match &self.network {
            Network::ResNet(model) | Network::ResNetModified(model) => model.forward(images),
            Network::EfficientNet(model) => model.forward(images),
            Network::Transformer(model) => model.forward(images),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match &self.network {
            Network::ResNet(_) => ModelKind::ResNet,
            Network::ResNetModified(_) => ModelKind::ResNetModified,
            Network::EfficientNet(_) => ModelKind::EfficientNet,
            Network::Transformer(_) => ModelKind::Transformer,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_every_model_outputs_class_logits() {
        let device = Default::default();
        for kind in ModelKind::ALL {
            for num_classes in [1, 7] {
                let model =
                    ExperimentModel::<TestBackend>::for_image_size(kind, num_classes, 32, &device)
                        .unwrap();
                assert_eq!(model.kind(), kind);
                assert_eq!(model.num_classes(), num_classes);

                let out = model.forward(Tensor::zeros([2, 1, 32, 32], &device));
                assert_eq!(out.dims(), [2, num_classes], "{kind}");
            }
        }
    }

    #[test]
    fn test_full_size_input() {
        let device = Default::default();
        for kind in ModelKind::ALL {
            let model = ExperimentModel::<TestBackend>::new(kind, 4, &device);
            let size = DEFAULT_IMAGE_SIZE;
            let out = model.forward(Tensor::zeros([1, 1, size, size], &device));
            assert_eq!(out.dims(), [1, 4], "{kind}");
        }
    }

    #[test]
    fn test_invalid_construction() {
        let device = Default::default();
        assert!(
            ExperimentModel::<TestBackend>::for_image_size(ModelKind::ResNet, 0, 32, &device)
                .is_err()
        );
        assert!(
            ExperimentModel::<TestBackend>::for_image_size(ModelKind::Transformer, 2, 30, &device)
                .is_err()
        );
        // Convolutional models accept any size
        assert!(
            ExperimentModel::<TestBackend>::for_image_size(ModelKind::EfficientNet, 2, 30, &device)
                .is_ok()
        );
    }
}

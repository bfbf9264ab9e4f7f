//! ResNet-34 for single-channel input.
//!
//! Architecture:
//! - Stem: conv (7x7/2 or 3x3/1), batch norm, ReLU, optional 3x3/2 max-pool
//! - 4 residual stages of basic blocks: 3, 4, 6, 3 blocks, widths 64 to 512
//! - Global average pooling
//! - FC layer

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

const STAGE_DEPTHS: [usize; 4] = [3, 4, 6, 3];
const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];

/// First convolution of the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StemConfig {
    pub kernel: usize,
    pub stride: usize,
    pub padding: usize,
    pub max_pool: bool,
}

impl StemConfig {
    /// 7x7 stride-2 convolution followed by a 3x3 stride-2 max-pool
    pub fn standard() -> Self {
        Self {
            kernel: 7,
            stride: 2,
            padding: 3,
            max_pool: true,
        }
    }

    /// 3x3 stride-1 convolution and no max-pool, keeping 4x more resolution
    pub fn modified() -> Self {
        Self {
            kernel: 3,
            stride: 1,
            padding: 1,
            max_pool: false,
        }
    }
}

fn conv3x3<B: Backend>(
    in_ch: usize,
    out_ch: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_ch, out_ch], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

/// 1x1 projection on the skip path when shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_ch, out_ch], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_ch).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    activation: Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_ch != out_ch)
            .then(|| Downsample::new(in_ch, out_ch, stride, device));

        Self {
            conv1: conv3x3(in_ch, out_ch, stride, device),
            bn1: BatchNormConfig::new(out_ch).init(device),
            conv2: conv3x3(out_ch, out_ch, 1, device),
            bn2: BatchNormConfig::new(out_ch).init(device),
            downsample,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.activation.forward(x + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNet34<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    maxpool: Option<MaxPool2d>,
    blocks: Vec<BasicBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    activation: Relu,
}

impl<B: Backend> ResNet34<B> {
    pub fn new(stem: StemConfig, num_classes: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([1, 64], [stem.kernel, stem.kernel])
            .with_stride([stem.stride, stem.stride])
            .with_padding(PaddingConfig2d::Explicit(stem.padding, stem.padding))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(64).init(device);
        let maxpool = stem.max_pool.then(|| {
            MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init()
        });

        let mut blocks = Vec::with_capacity(STAGE_DEPTHS.iter().sum());
        let mut in_ch = 64;
        for (stage, (&depth, &width)) in STAGE_DEPTHS.iter().zip(STAGE_WIDTHS.iter()).enumerate() {
            for block in 0..depth {
                let stride = if stage > 0 && block == 0 { 2 } else { 1 };
                blocks.push(BasicBlock::new(in_ch, width, stride, device));
                in_ch = width;
            }
        }

        Self {
            conv1,
            bn1,
            maxpool,
            blocks,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(512, num_classes).init(device),
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let mut x = self.activation.forward(x);
        if let Some(maxpool) = &self.maxpool {
            x = maxpool.forward(x);
        }

        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.avgpool.forward(x);
        let [batch, channels, _, _] = x.dims();
        self.fc.forward(x.reshape([batch, channels]))
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn has_stem_pool(&self) -> bool {
        self.maxpool.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_block_count_is_resnet34() {
        let device = Default::default();
        let model = ResNet34::<TestBackend>::new(StemConfig::standard(), 3, &device);
        assert_eq!(model.num_blocks(), 16);
        assert!(model.has_stem_pool());
    }

    #[test]
    fn test_modified_stem_drops_pool() {
        let device = Default::default();
        let model = ResNet34::<TestBackend>::new(StemConfig::modified(), 3, &device);
        assert!(!model.has_stem_pool());

        let out = model.forward(Tensor::zeros([2, 1, 32, 32], &device));
        assert_eq!(out.dims(), [2, 3]);
    }

    #[test]
    fn test_basic_block_downsamples() {
        let device = Default::default();
        let block = BasicBlock::<TestBackend>::new(64, 128, 2, &device);
        let out = block.forward(Tensor::zeros([1, 64, 8, 8], &device));
        assert_eq!(out.dims(), [1, 128, 4, 4]);
    }
}

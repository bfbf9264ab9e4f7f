//! EfficientNet-B0 for single-channel input.
//!
//! Architecture:
//! - Stem: conv 3x3/2, 1 -> 32
//! - 16 MBConv blocks with squeeze-and-excitation, SiLU activations
//! - Head: conv 1x1 320 -> 1280, global average pooling, dropout, FC

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{
        activation::{sigmoid, silu},
        backend::Backend,
        Tensor,
    },
};

/// One stage of the B0 table
#[derive(Debug, Clone, Copy)]
struct StageConfig {
    expand_ratio: usize,
    kernel: usize,
    stride: usize,
    out_channels: usize,
    repeats: usize,
}

const fn stage(
    expand_ratio: usize,
    kernel: usize,
    stride: usize,
    out_channels: usize,
    repeats: usize,
) -> StageConfig {
    StageConfig {
        expand_ratio,
        kernel,
        stride,
        out_channels,
        repeats,
    }
}

const B0_STAGES: [StageConfig; 7] = [
    stage(1, 3, 1, 16, 1),
    stage(6, 3, 2, 24, 2),
    stage(6, 5, 2, 40, 2),
    stage(6, 3, 2, 80, 3),
    stage(6, 5, 1, 112, 3),
    stage(6, 5, 2, 192, 4),
    stage(6, 3, 1, 320, 1),
];

const STEM_CHANNELS: usize = 32;
const HEAD_CHANNELS: usize = 1280;
const CLASSIFIER_DROPOUT: f64 = 0.2;

/// Convolution, batch norm, optional SiLU
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    activate: bool,
}

impl<B: Backend> ConvBn<B> {
    fn new(
        channels: [usize; 2],
        kernel: usize,
        stride: usize,
        groups: usize,
        activate: bool,
        device: &B::Device,
    ) -> Self {
        let padding = kernel / 2;
        Self {
            conv: Conv2dConfig::new(channels, [kernel, kernel])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_groups(groups)
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(channels[1]).init(device),
            activate,
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.bn.forward(self.conv.forward(x));
        if self.activate {
            silu(x)
        } else {
            x
        }
    }
}

/// Squeeze-and-excitation: channel gating from pooled features
#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    pool: AdaptiveAvgPool2d,
    reduce: Conv2d<B>,
    expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcitation<B> {
    fn new(channels: usize, squeeze: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeeze], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeeze, channels], [1, 1]).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let scale = self.pool.forward(x.clone());
        let scale = silu(self.reduce.forward(scale));
        let scale = sigmoid(self.expand.forward(scale));
        x * scale
    }
}

/// Mobile inverted bottleneck block
#[derive(Module, Debug)]
pub struct MBConv<B: Backend> {
    expand: Option<ConvBn<B>>,
    depthwise: ConvBn<B>,
    se: SqueezeExcitation<B>,
    project: ConvBn<B>,
    residual: bool,
}

impl<B: Backend> MBConv<B> {
    fn new(
        in_ch: usize,
        out_ch: usize,
        expand_ratio: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_ch * expand_ratio;
        let expand =
            (expand_ratio != 1).then(|| ConvBn::new([in_ch, hidden], 1, 1, 1, true, device));

        Self {
            expand,
            depthwise: ConvBn::new([hidden, hidden], kernel, stride, hidden, true, device),
            se: SqueezeExcitation::new(hidden, (in_ch / 4).max(1), device),
            project: ConvBn::new([hidden, out_ch], 1, 1, 1, false, device),
            residual: stride == 1 && in_ch == out_ch,
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => expand.forward(input.clone()),
            None => input.clone(),
        };
        let x = self.depthwise.forward(x);
        let x = self.se.forward(x);
        let x = self.project.forward(x);

        if self.residual {
            x + input
        } else {
            x
        }
    }
}

#[derive(Module, Debug)]
pub struct EfficientNetB0<B: Backend> {
    stem: ConvBn<B>,
    blocks: Vec<MBConv<B>>,
    head: ConvBn<B>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    fc: Linear<B>,
}

impl<B: Backend> EfficientNetB0<B> {
    pub fn new(num_classes: usize, device: &B::Device) -> Self {
        let stem = ConvBn::new([1, STEM_CHANNELS], 3, 2, 1, true, device);

        let mut blocks = Vec::new();
        let mut in_ch = STEM_CHANNELS;
        for cfg in B0_STAGES {
            for i in 0..cfg.repeats {
                let stride = if i == 0 { cfg.stride } else { 1 };
                blocks.push(MBConv::new(
                    in_ch,
                    cfg.out_channels,
                    cfg.expand_ratio,
                    cfg.kernel,
                    stride,
                    device,
                ));
                in_ch = cfg.out_channels;
            }
        }

        Self {
            stem,
            blocks,
            head: ConvBn::new([in_ch, HEAD_CHANNELS], 1, 1, 1, true, device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(CLASSIFIER_DROPOUT).init(),
            fc: LinearConfig::new(HEAD_CHANNELS, num_classes).init(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(input);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.head.forward(x);

        // Flatten [batch, channels, 1, 1] -> [batch, channels]
        let x = self.pool.forward(x);
        let [batch, channels, _, _] = x.dims();
        let x = self.dropout.forward(x.reshape([batch, channels]));
        self.fc.forward(x)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

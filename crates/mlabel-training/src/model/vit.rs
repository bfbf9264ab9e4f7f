//! Vision Transformer for single-channel input.
//!
//! Patches are embedded by a strided convolution, a learned class token is
//! prepended and learned position embeddings are added. Encoder blocks are
//! pre-norm; the head reads the class token.

use burn::{
    module::{Module, Param},
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        conv::{Conv2d, Conv2dConfig},
        Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig,
    },
    tensor::{activation::gelu, backend::Backend, Distribution, Tensor},
};
use mlabel_core::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct VitConfig {
    pub image_size: usize,
    pub patch_size: usize,
    pub in_channels: usize,
    pub embed_dim: usize,
    pub depth: usize,
    pub num_heads: usize,
    pub mlp_ratio: f64,
    /// Dropout on embeddings, attention output and MLP
    pub dropout: f64,
    /// Dropout on attention weights
    pub attn_dropout: f64,
    pub layer_norm_eps: f64,
}

impl Default for VitConfig {
    fn default() -> Self {
        Self {
            image_size: 256,
            patch_size: 8,
            in_channels: 1,
            embed_dim: 128,
            depth: 6,
            num_heads: 16,
            mlp_ratio: 4.0,
            dropout: 0.3,
            attn_dropout: 0.3,
            layer_norm_eps: 1e-6,
        }
    }
}

impl VitConfig {
    pub fn with_image_size(mut self, image_size: usize) -> Self {
        self.image_size = image_size;
        self
    }

    pub fn num_patches(&self) -> usize {
        let side = self.image_size / self.patch_size;
        side * side
    }

    pub fn mlp_dim(&self) -> usize {
        (self.embed_dim as f64 * self.mlp_ratio) as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.patch_size == 0 || self.image_size % self.patch_size != 0 {
            return Err(Error::Model(format!(
                "image size {} is not a multiple of patch size {}",
                self.image_size, self.patch_size
            )));
        }
        if self.num_heads == 0 || self.embed_dim % self.num_heads != 0 {
            return Err(Error::Model(format!(
                "embedding width {} is not divisible by {} heads",
                self.embed_dim, self.num_heads
            )));
        }
        Ok(())
    }
}

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> Mlp<B> {
    fn new(dim: usize, hidden: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(dim, hidden).init(device),
            fc2: LinearConfig::new(hidden, dim).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.dropout.forward(gelu(self.fc1.forward(x)));
        self.dropout.forward(self.fc2.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    norm1: LayerNorm<B>,
    attn: MultiHeadAttention<B>,
    norm2: LayerNorm<B>,
    mlp: Mlp<B>,
    dropout: Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    fn new(config: &VitConfig, device: &B::Device) -> Self {
        Self {
            norm1: LayerNormConfig::new(config.embed_dim)
                .with_epsilon(config.layer_norm_eps)
                .init(device),
            attn: MultiHeadAttentionConfig::new(config.embed_dim, config.num_heads)
                .with_dropout(config.attn_dropout)
                .init(device),
            norm2: LayerNormConfig::new(config.embed_dim)
                .with_epsilon(config.layer_norm_eps)
                .init(device),
            mlp: Mlp::new(config.embed_dim, config.mlp_dim(), config.dropout, device),
            dropout: DropoutConfig::new(config.dropout).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let attn = self
            .attn
            .forward(MhaInput::self_attn(self.norm1.forward(x.clone())))
            .context;
        let x = x + self.dropout.forward(attn);
        let mlp = self.mlp.forward(self.norm2.forward(x.clone()));
        x + mlp
    }
}

#[derive(Module, Debug)]
pub struct VisionTransformer<B: Backend> {
    patch_embed: Conv2d<B>,
    cls_token: Param<Tensor<B, 3>>,
    pos_embed: Param<Tensor<B, 3>>,
    pos_dropout: Dropout,
    blocks: Vec<EncoderBlock<B>>,
    norm: LayerNorm<B>,
    head: Linear<B>,
}

impl<B: Backend> VisionTransformer<B> {
    /// Builds the network; `config` must satisfy `VitConfig::validate`
    pub fn new(config: &VitConfig, num_classes: usize, device: &B::Device) -> Self {
        let dim = config.embed_dim;
        let patch = config.patch_size;

        let patch_embed = Conv2dConfig::new([config.in_channels, dim], [patch, patch])
            .with_stride([patch, patch])
            .init(device);
        let cls_token = Param::from_tensor(Tensor::random(
            [1, 1, dim],
            Distribution::Normal(0.0, 0.02),
            device,
        ));
        let pos_embed = Param::from_tensor(Tensor::random(
            [1, config.num_patches() + 1, dim],
            Distribution::Normal(0.0, 0.02),
            device,
        ));

        let blocks = (0..config.depth)
            .map(|_| EncoderBlock::new(config, device))
            .collect();

        Self {
            patch_embed,
            cls_token,
            pos_embed,
            pos_dropout: DropoutConfig::new(config.dropout).init(),
            blocks,
            norm: LayerNormConfig::new(dim)
                .with_epsilon(config.layer_norm_eps)
                .init(device),
            head: LinearConfig::new(dim, num_classes).init(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let batch = input.dims()[0];

        // [batch, dim, h/p, w/p] -> [batch, patches, dim]
        let x = self.patch_embed.forward(input);
        let x: Tensor<B, 3> = x.flatten(2, 3).swap_dims(1, 2);
        let dim = x.dims()[2];

        let cls = self.cls_token.val().repeat_dim(0, batch);
        let x = Tensor::cat(vec![cls, x], 1) + self.pos_embed.val();
        let mut x = self.pos_dropout.forward(x);

        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.norm.forward(x);

        let cls = x.slice([0..batch, 0..1, 0..dim]).reshape([batch, dim]);
        self.head.forward(cls)
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }
}

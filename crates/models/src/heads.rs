//! Task heads. Each head consumes the trunk's feature map and produces one
//! named output; heads are siblings and never read each other's outputs.

use crate::encoder::EncoderVariant;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::module::adaptive_avg_pool2d;
use burn::tensor::Tensor;

/// Decoder path: three stride-2 transpose convs back to input resolution,
/// then a 1x1 projection to per-pixel logits.
#[derive(Debug, Module)]
pub struct SegmentationHead<B: Backend> {
    up1: ConvTranspose2d<B>,
    up2: ConvTranspose2d<B>,
    up3: ConvTranspose2d<B>,
    out: Conv2d<B>,
}

impl<B: Backend> SegmentationHead<B> {
    pub fn new(in_channels: usize, device: &B::Device) -> Self {
        let m1 = (in_channels / 2).max(8);
        let m2 = (in_channels / 4).max(8);
        let m3 = (in_channels / 8).max(8);
        Self {
            up1: up_block(in_channels, m1, device),
            up2: up_block(m1, m2, device),
            up3: up_block(m2, m3, device),
            out: Conv2dConfig::new([m3, 1], [1, 1]).init(device),
        }
    }

    /// Maps trunk features to logits at `(height, width)` resolution,
    /// shape [batch, 1, H, W].
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.up1.forward(features));
        let x = relu(self.up2.forward(x));
        let x = relu(self.up3.forward(x));
        self.out.forward(x)
    }
}

/// Pooling + dense path producing one presence probability per sample.
#[derive(Debug, Module)]
pub struct BinaryClassificationHead<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
}

impl<B: Backend> BinaryClassificationHead<B> {
    /// `variant` selects head capacity to match the trunk size. A head built
    /// with `trainable=false` still participates in forward computation but
    /// never updates its own weights.
    pub fn new(
        variant: EncoderVariant,
        in_channels: usize,
        trainable: bool,
        device: &B::Device,
    ) -> Self {
        let hidden = variant.head_hidden();
        let head = Self {
            fc1: LinearConfig::new(in_channels, hidden).init(device),
            fc2: LinearConfig::new(hidden, 1).init(device),
        };
        if trainable {
            head
        } else {
            head.no_grad()
        }
    }

    /// Shape [batch, 1], values in (0, 1).
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = pool_flatten(features);
        let x = relu(self.fc1.forward(x));
        sigmoid(self.fc2.forward(x))
    }
}

/// Pooling + dense path regressing one normalized xyxy box per sample.
#[derive(Debug, Module)]
pub struct BoxRegressionHead<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
}

impl<B: Backend> BoxRegressionHead<B> {
    pub fn new(
        variant: EncoderVariant,
        in_channels: usize,
        trainable: bool,
        device: &B::Device,
    ) -> Self {
        let hidden = variant.head_hidden();
        let head = Self {
            fc1: LinearConfig::new(in_channels, hidden).init(device),
            fc2: LinearConfig::new(hidden, 4).init(device),
        };
        if trainable {
            head
        } else {
            head.no_grad()
        }
    }

    /// Shape [batch, 4]. Sigmoid keeps coordinates in a stable 0..1 range.
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = pool_flatten(features);
        let x = relu(self.fc1.forward(x));
        sigmoid(self.fc2.forward(x))
    }
}

fn up_block<B: Backend>(in_ch: usize, out_ch: usize, device: &B::Device) -> ConvTranspose2d<B> {
    ConvTranspose2dConfig::new([in_ch, out_ch], [2, 2])
        .with_stride([2, 2])
        .init(device)
}

fn pool_flatten<B: Backend>(features: Tensor<B, 4>) -> Tensor<B, 2> {
    let pooled = adaptive_avg_pool2d(features, [1, 1]);
    pooled.flatten(1, 3)
}

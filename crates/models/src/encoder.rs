//! The shared convolutional trunk.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Total spatial downsampling applied by the trunk (three stride-2 stages).
pub const DOWNSAMPLE: usize = 8;

/// Trunk size selector. Variants scale channel widths; heads built for a
/// variant size their capacity to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderVariant {
    B0,
    B1,
    B2,
}

impl EncoderVariant {
    /// Channel widths of the three downsampling stages.
    pub fn filters(&self) -> (usize, usize, usize) {
        match self {
            EncoderVariant::B0 => (16, 32, 64),
            EncoderVariant::B1 => (24, 48, 96),
            EncoderVariant::B2 => (32, 64, 128),
        }
    }

    /// Hidden width used by the pooled task heads.
    pub fn head_hidden(&self) -> usize {
        match self {
            EncoderVariant::B0 => 64,
            EncoderVariant::B1 => 96,
            EncoderVariant::B2 => 128,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderVariant::B0 => "B0",
            EncoderVariant::B1 => "B1",
            EncoderVariant::B2 => "B2",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub variant: EncoderVariant,
    /// Input geometry (height, width, channels).
    pub input: (usize, usize, usize),
}

impl EncoderConfig {
    /// One-line structure summary for startup logs.
    pub fn describe(&self) -> String {
        let (h, w, c) = self.input;
        let (_, _, f3) = self.variant.filters();
        format!(
            "Encoder[{}] input {}x{}x{} -> features {}x{}x{}",
            self.variant.as_str(),
            c,
            h,
            w,
            f3,
            h / DOWNSAMPLE,
            w / DOWNSAMPLE
        )
    }
}

/// Three stride-2 conv stages mapping the input image to a shared feature
/// map at 1/8 resolution. All heads read this map; updating trunk weights
/// moves every head's forward behavior.
#[derive(Debug, Module)]
pub struct Encoder<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    out_channels: usize,
}

impl<B: Backend> Encoder<B> {
    /// Build the trunk. With `trainable` unset the trunk still runs forward
    /// but its parameters never receive gradient updates.
    pub fn new(cfg: &EncoderConfig, trainable: bool, device: &B::Device) -> Self {
        let (_, _, channels) = cfg.input;
        let (f1, f2, f3) = cfg.variant.filters();
        let conv1 = conv_block(channels, f1, device);
        let conv2 = conv_block(f1, f2, device);
        let conv3 = conv_block(f2, f3, device);
        let encoder = Self {
            conv1,
            conv2,
            conv3,
            out_channels: f3,
        };
        if trainable {
            encoder
        } else {
            encoder.no_grad()
        }
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(input));
        let x = relu(self.conv2.forward(x));
        relu(self.conv3.forward(x))
    }
}

fn conv_block<B: Backend>(in_ch: usize, out_ch: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_ch, out_ch], [3, 3])
        .with_stride([2, 2])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

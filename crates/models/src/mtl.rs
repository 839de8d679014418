//! Multi-task composition: one shared trunk, up to three sibling heads.

use crate::encoder::{Encoder, EncoderVariant, DOWNSAMPLE};
use crate::heads::{BinaryClassificationHead, BoxRegressionHead, SegmentationHead};
use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use thiserror::Error;

pub const SEGNET_OUT: &str = "segnet_out";
pub const BIN_CLASS_OUT: &str = "bin_class_out";
pub const BBOX_OUT: &str = "bbox_out";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("cannot build a multi-task model with zero heads registered")]
    NoHeads,
    #[error("input geometry {height}x{width} must be divisible by {downsample}")]
    Geometry {
        height: usize,
        width: usize,
        downsample: usize,
    },
}

/// Forward result; a head that was never registered yields `None`.
#[derive(Debug)]
pub struct MtlOutput<B: Backend> {
    /// Per-pixel logits, [batch, 1, H, W].
    pub segnet_out: Option<Tensor<B, 4>>,
    /// Presence probability, [batch, 1].
    pub bin_class_out: Option<Tensor<B, 2>>,
    /// Normalized xyxy box, [batch, 4].
    pub bbox_out: Option<Tensor<B, 2>>,
}

/// The composed multi-task unit. The trunk is owned here and shared across
/// heads per forward pass; one optimizer step updates trunk parameters
/// exactly once even though all three losses contribute to them.
#[derive(Debug, Module)]
pub struct MtlModel<B: Backend> {
    encoder: Encoder<B>,
    seg_head: Option<SegmentationHead<B>>,
    class_head: Option<BinaryClassificationHead<B>>,
    box_head: Option<BoxRegressionHead<B>>,
}

impl<B: Backend> MtlModel<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> MtlOutput<B> {
        let features = self.encoder.forward(input);
        MtlOutput {
            segnet_out: self
                .seg_head
                .as_ref()
                .map(|head| head.forward(features.clone())),
            bin_class_out: self
                .class_head
                .as_ref()
                .map(|head| head.forward(features.clone())),
            bbox_out: self.box_head.as_ref().map(|head| head.forward(features)),
        }
    }

    pub fn has_output(&self, name: &str) -> bool {
        match name {
            SEGNET_OUT => self.seg_head.is_some(),
            BIN_CLASS_OUT => self.class_head.is_some(),
            BBOX_OUT => self.box_head.is_some(),
            _ => false,
        }
    }

    pub fn output_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.seg_head.is_some() {
            names.push(SEGNET_OUT);
        }
        if self.class_head.is_some() {
            names.push(BIN_CLASS_OUT);
        }
        if self.box_head.is_some() {
            names.push(BBOX_OUT);
        }
        names
    }

    /// One-line structure summary for startup logs.
    pub fn describe(&self) -> String {
        format!("MtlModel outputs: {}", self.output_names().join(", "))
    }
}

/// Registers heads against one shared encoder, in call order, then finalizes
/// the composed model. Each `add_*` mutates builder state; `build` fails if
/// no head was registered.
pub struct MtlBuilder<B: Backend> {
    encoder: Encoder<B>,
    device: B::Device,
    seg_head: Option<SegmentationHead<B>>,
    class_head: Option<BinaryClassificationHead<B>>,
    box_head: Option<BoxRegressionHead<B>>,
}

impl<B: Backend> MtlBuilder<B> {
    pub fn new(
        encoder: Encoder<B>,
        geometry: (usize, usize, usize),
        device: &B::Device,
    ) -> Result<Self, ModelError> {
        let (height, width, _) = geometry;
        if height % DOWNSAMPLE != 0 || width % DOWNSAMPLE != 0 {
            return Err(ModelError::Geometry {
                height,
                width,
                downsample: DOWNSAMPLE,
            });
        }
        Ok(Self {
            encoder,
            device: device.clone(),
            seg_head: None,
            class_head: None,
            box_head: None,
        })
    }

    pub fn add_segmentation_head(&mut self) {
        self.seg_head = Some(SegmentationHead::new(
            self.encoder.out_channels(),
            &self.device,
        ));
    }

    pub fn add_binary_classification_head(&mut self, variant: EncoderVariant, trainable: bool) {
        self.class_head = Some(BinaryClassificationHead::new(
            variant,
            self.encoder.out_channels(),
            trainable,
            &self.device,
        ));
    }

    pub fn add_bbox_regression_head(&mut self, variant: EncoderVariant, trainable: bool) {
        self.box_head = Some(BoxRegressionHead::new(
            variant,
            self.encoder.out_channels(),
            trainable,
            &self.device,
        ));
    }

    pub fn build(self) -> Result<MtlModel<B>, ModelError> {
        if self.seg_head.is_none() && self.class_head.is_none() && self.box_head.is_none() {
            return Err(ModelError::NoHeads);
        }
        Ok(MtlModel {
            encoder: self.encoder,
            seg_head: self.seg_head,
            class_head: self.class_head,
            box_head: self.box_head,
        })
    }
}

//! Burn modules for the multi-task lesion model.
//!
//! This crate defines the network architecture:
//! - `Encoder`: the shared convolutional trunk, sized by variant.
//! - `SegmentationHead` / `BinaryClassificationHead` / `BoxRegressionHead`:
//!   task heads that read only the trunk's feature map.
//! - `MtlBuilder` / `MtlModel`: composition of one trunk with up to three
//!   sibling heads into a single trainable unit with named outputs.
//!
//! These are pure Burn Modules with no awareness of data loading or the
//! training schedule; the `training` crate drives them.

pub mod encoder;
pub mod heads;
pub mod mtl;

pub use encoder::{Encoder, EncoderConfig, EncoderVariant, DOWNSAMPLE};
pub use heads::{BinaryClassificationHead, BoxRegressionHead, SegmentationHead};
pub use mtl::{ModelError, MtlBuilder, MtlModel, MtlOutput, BBOX_OUT, BIN_CLASS_OUT, SEGNET_OUT};

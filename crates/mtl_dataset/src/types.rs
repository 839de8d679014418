//! Core types, error definitions, and data structures for mtl_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, MtlDatasetError>;

#[derive(Debug, Error)]
pub enum MtlDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("label validation failed at {path}: {msg}")]
    Validation { path: PathBuf, msg: String },
    #[error("image missing for label {path}")]
    MissingImage { path: PathBuf },
    #[error("image file missing for label {path}: {image}")]
    MissingImageFile { path: PathBuf, image: PathBuf },
    #[error("mask file missing for label {path}: {mask}")]
    MissingMaskFile { path: PathBuf, mask: PathBuf },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{modality} stream exhausted; synchronized pulls require a repeating stream")]
    StreamExhausted { modality: &'static str },
    #[error("stream alignment broken: {0}")]
    Alignment(String),
    #[error("{0}")]
    Other(String),
}

/// Dataset partition selector. `Test` exists at the stream boundary but
/// nothing in the training path consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

/// One fully loaded example: all four modalities, aligned by construction.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub frame_id: u64,
    /// Image in CHW layout (3 channels), normalized to [0, 1].
    pub image_chw: Vec<f32>,
    /// Segmentation mask in HW layout, values in {0.0, 1.0}.
    pub mask: Vec<f32>,
    /// Binary presence label (0.0 or 1.0).
    pub label: f32,
    /// Normalized bounding box [x_min, y_min, x_max, y_max] in 0..1;
    /// all-zero when no lesion is present.
    pub bbox: [f32; 4],
    pub width: u32,
    pub height: u32,
}

/// One pull's worth of the image modality.
#[derive(Debug, Clone)]
pub struct ImageBlock {
    pub frame_ids: Vec<u64>,
    /// Concatenated per-sample CHW buffers.
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

/// One pull's worth of the mask modality.
#[derive(Debug, Clone)]
pub struct MaskBlock {
    pub frame_ids: Vec<u64>,
    /// Concatenated per-sample HW buffers.
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

/// One pull's worth of the binary-label modality.
#[derive(Debug, Clone)]
pub struct LabelBlock {
    pub frame_ids: Vec<u64>,
    pub values: Vec<f32>,
}

/// One pull's worth of the bounding-box modality.
#[derive(Debug, Clone)]
pub struct BoxBlock {
    pub frame_ids: Vec<u64>,
    pub boxes: Vec<[f32; 4]>,
}

/// On-disk label metadata, one JSON file per frame under `labels/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEntry {
    pub frame_id: u64,
    pub image: String,
    pub mask: String,
    pub image_present: bool,
    pub lesion_present: bool,
    pub bbox_px: Option<[f32; 4]>,
    pub bbox_norm: Option<[f32; 4]>,
}

//! Aligned multi-modality streams for multi-task lesion training.
//!
//! This crate provides:
//! - Loading capture datasets (image + mask + presence label + bbox) from
//!   filesystem
//! - Deterministic train/val/test splitting with optional k-fold selection
//! - Infinitely-repeating per-modality block streams
//! - The synchronized generator that pulls all four streams in lockstep and
//!   applies shared shuffling and augmentation

pub mod aug;
pub mod capture;
pub mod splits;
pub mod stream;
pub mod sync;
pub mod types;

pub use aug::AugmentConfig;
pub use capture::{index_labels, load_capture_dir};
pub use splits::{split_records, SplitSpec};
pub use stream::{BlockStream, CaptureSource, StreamSource};
pub use sync::{AlignedBatch, AlignedBatchIter, ValBoxSource};
pub use types::*;

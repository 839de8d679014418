//! The synchronized sample generator: four per-modality cursors pulled in
//! lockstep, yielding one aligned batch per call.
//!
//! Single-consumer and stateful: every pull advances all four cursors, so a
//! second concurrent consumer would break the alignment invariant. Streams
//! repeat indefinitely upstream; the generator itself never terminates and is
//! bounded only by the caller's step budget.

use crate::aug::{augment_sample, AugmentConfig};
use crate::stream::{BlockStream, StreamSource};
use crate::types::{
    BoxBlock, DatasetResult, ImageBlock, LabelBlock, MaskBlock, MtlDatasetError, Split,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Where the validation generator draws its bounding-box stream from. An
/// earlier revision wired it to the training bbox stream by mistake;
/// `TrainingLegacy` reproduces that wiring for comparison runs, `Validation`
/// (the default) is the corrected one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValBoxSource {
    #[default]
    Validation,
    TrainingLegacy,
}

/// One aligned training batch: all four modalities in matching sample order.
#[derive(Debug, Clone)]
pub struct AlignedBatch {
    pub frame_ids: Vec<u64>,
    /// Concatenated per-sample CHW buffers.
    pub images: Vec<f32>,
    /// Concatenated per-sample HW buffers.
    pub masks: Vec<f32>,
    pub labels: Vec<f32>,
    pub boxes: Vec<[f32; 4]>,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl AlignedBatch {
    pub fn len(&self) -> usize {
        self.frame_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_ids.is_empty()
    }
}

/// Pull-based generator over four aligned block streams. The training variant
/// shuffles each batch with one shared permutation and applies joint
/// augmentation; the validation variant passes draws through untouched.
pub struct AlignedBatchIter {
    images: BlockStream<ImageBlock>,
    masks: BlockStream<MaskBlock>,
    labels: BlockStream<LabelBlock>,
    boxes: BlockStream<BoxBlock>,
    shuffle: bool,
    augment: Option<AugmentConfig>,
    /// Cleared only under the legacy validation wiring, where the bbox stream
    /// comes from a different split and its frame ids cannot agree.
    check_box_ids: bool,
    rng: StdRng,
}

impl AlignedBatchIter {
    /// Training variant: shuffling and augmentation enabled.
    pub fn for_training<S: StreamSource + ?Sized>(
        source: &S,
        augment: AugmentConfig,
        seed: Option<u64>,
    ) -> DatasetResult<Self> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Ok(Self {
            images: source.image_stream(Split::Train)?,
            masks: source.mask_stream(Split::Train)?,
            labels: source.binary_stream(Split::Train)?,
            boxes: source.bbox_stream(Split::Train)?,
            shuffle: true,
            augment: Some(augment),
            check_box_ids: true,
            rng,
        })
    }

    /// Validation variant: straight pass-through of the aligned draws.
    pub fn for_validation<S: StreamSource + ?Sized>(
        source: &S,
        box_source: ValBoxSource,
    ) -> DatasetResult<Self> {
        let box_split = match box_source {
            ValBoxSource::Validation => Split::Val,
            ValBoxSource::TrainingLegacy => Split::Train,
        };
        Ok(Self {
            images: source.image_stream(Split::Val)?,
            masks: source.mask_stream(Split::Val)?,
            labels: source.binary_stream(Split::Val)?,
            boxes: source.bbox_stream(box_split)?,
            shuffle: false,
            augment: None,
            check_box_ids: box_source == ValBoxSource::Validation,
            rng: StdRng::from_rng(&mut rand::rng()),
        })
    }

    /// Draw one element from each stream in lockstep and assemble the next
    /// aligned batch. Exhaustion of any underlying stream is fatal and
    /// propagates to the caller.
    pub fn next_aligned(&mut self) -> DatasetResult<AlignedBatch> {
        let images = self.images.next_block()?;
        let masks = self.masks.next_block()?;
        let labels = self.labels.next_block()?;
        let boxes = self.boxes.next_block()?;

        check_aligned(&images, &masks, &labels, &boxes, !self.check_box_ids)?;

        let mut batch = AlignedBatch {
            frame_ids: images.frame_ids,
            images: images.data,
            masks: masks.data,
            labels: labels.values,
            boxes: boxes.boxes,
            width: images.width,
            height: images.height,
            channels: images.channels,
        };

        if self.shuffle {
            let mut perm: Vec<usize> = (0..batch.len()).collect();
            perm.shuffle(&mut self.rng);
            apply_permutation(&mut batch, &perm);
        }
        if let Some(cfg) = &self.augment {
            let (w, h, c) = (
                batch.width as usize,
                batch.height as usize,
                batch.channels as usize,
            );
            let image_stride = w * h * c;
            let mask_stride = w * h;
            for i in 0..batch.len() {
                let image = &mut batch.images[i * image_stride..(i + 1) * image_stride];
                let mask = &mut batch.masks[i * mask_stride..(i + 1) * mask_stride];
                augment_sample(image, mask, &mut batch.boxes[i], w, h, c, cfg, &mut self.rng);
            }
        }

        Ok(batch)
    }
}

fn check_aligned(
    images: &ImageBlock,
    masks: &MaskBlock,
    labels: &LabelBlock,
    boxes: &BoxBlock,
    skip_box_ids: bool,
) -> DatasetResult<()> {
    let n = images.frame_ids.len();
    if masks.frame_ids.len() != n || labels.frame_ids.len() != n || boxes.frame_ids.len() != n {
        return Err(MtlDatasetError::Alignment(format!(
            "block sizes diverge: image={} mask={} label={} bbox={}",
            n,
            masks.frame_ids.len(),
            labels.frame_ids.len(),
            boxes.frame_ids.len()
        )));
    }
    if masks.width != images.width || masks.height != images.height {
        return Err(MtlDatasetError::Alignment(format!(
            "mask geometry {}x{} does not match image geometry {}x{}",
            masks.width, masks.height, images.width, images.height
        )));
    }
    if masks.frame_ids != images.frame_ids {
        return Err(MtlDatasetError::Alignment(
            "mask frame ids diverge from image frame ids".to_string(),
        ));
    }
    if labels.frame_ids != images.frame_ids {
        return Err(MtlDatasetError::Alignment(
            "label frame ids diverge from image frame ids".to_string(),
        ));
    }
    if !skip_box_ids && boxes.frame_ids != images.frame_ids {
        return Err(MtlDatasetError::Alignment(
            "bbox frame ids diverge from image frame ids".to_string(),
        ));
    }
    Ok(())
}

/// Apply one permutation identically to every modality of the batch.
pub(crate) fn apply_permutation(batch: &mut AlignedBatch, perm: &[usize]) {
    let (w, h, c) = (
        batch.width as usize,
        batch.height as usize,
        batch.channels as usize,
    );
    let image_stride = w * h * c;
    let mask_stride = w * h;

    let mut images = Vec::with_capacity(batch.images.len());
    let mut masks = Vec::with_capacity(batch.masks.len());
    let mut frame_ids = Vec::with_capacity(batch.len());
    let mut labels = Vec::with_capacity(batch.len());
    let mut boxes = Vec::with_capacity(batch.len());
    for &p in perm {
        images.extend_from_slice(&batch.images[p * image_stride..(p + 1) * image_stride]);
        masks.extend_from_slice(&batch.masks[p * mask_stride..(p + 1) * mask_stride]);
        frame_ids.push(batch.frame_ids[p]);
        labels.push(batch.labels[p]);
        boxes.push(batch.boxes[p]);
    }
    batch.images = images;
    batch.masks = masks;
    batch.frame_ids = frame_ids;
    batch.labels = labels;
    batch.boxes = boxes;
}

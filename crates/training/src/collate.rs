//! Assembling aligned batches into Burn tensors.

use burn::tensor::{backend::Backend, Tensor};
use mtl_dataset::AlignedBatch;

/// One training batch as tensors, matching the model's named outputs:
/// masks target `segnet_out`, labels target `bin_class_out`, boxes target
/// `bbox_out`.
#[derive(Debug, Clone)]
pub struct MtlBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub masks: Tensor<B, 4>,
    pub labels: Tensor<B, 2>,
    pub boxes: Tensor<B, 2>,
}

pub fn collate<B: Backend>(batch: &AlignedBatch, device: &B::Device) -> anyhow::Result<MtlBatch<B>> {
    if batch.is_empty() {
        anyhow::bail!("cannot collate an empty batch");
    }
    let n = batch.len();
    let (h, w, c) = (
        batch.height as usize,
        batch.width as usize,
        batch.channels as usize,
    );
    if batch.images.len() != n * c * h * w {
        anyhow::bail!(
            "image buffer holds {} floats, expected {} for {n}x{c}x{h}x{w}",
            batch.images.len(),
            n * c * h * w
        );
    }
    if batch.masks.len() != n * h * w {
        anyhow::bail!(
            "mask buffer holds {} floats, expected {} for {n}x1x{h}x{w}",
            batch.masks.len(),
            n * h * w
        );
    }
    if batch.labels.len() != n || batch.boxes.len() != n {
        anyhow::bail!(
            "label/box counts ({}/{}) do not match batch size {n}",
            batch.labels.len(),
            batch.boxes.len()
        );
    }

    let images =
        Tensor::<B, 1>::from_floats(batch.images.as_slice(), device).reshape([n, c, h, w]);
    let masks = Tensor::<B, 1>::from_floats(batch.masks.as_slice(), device).reshape([n, 1, h, w]);
    let labels = Tensor::<B, 1>::from_floats(batch.labels.as_slice(), device).reshape([n, 1]);
    let boxes_flat: Vec<f32> = batch.boxes.iter().flatten().copied().collect();
    let boxes = Tensor::<B, 1>::from_floats(boxes_flat.as_slice(), device).reshape([n, 4]);

    Ok(MtlBatch {
        images,
        masks,
        labels,
        boxes,
    })
}

//! End-to-end checks of the synchronized generator: alignment, shared
//! shuffling, validation purity, joint augmentation, exhaustion.

use image::{GrayImage, Luma, Rgb, RgbImage};
use mtl_dataset::{
    AlignedBatchIter, AugmentConfig, BlockStream, BoxBlock, CaptureSource, DatasetResult,
    ImageBlock, LabelBlock, LabelEntry, MaskBlock, MtlDatasetError, Split, SplitSpec, StreamSource,
    ValBoxSource,
};
use std::fs;
use std::path::Path;

/// Write a synthetic capture run: frame ids are encoded in the red channel
/// (`id * 10`), the green channel marks the right half, and masks cover the
/// left half for frames carrying a lesion.
fn create_synthetic_run(root: &Path, frame_count: usize, all_lesions: bool) -> anyhow::Result<()> {
    let labels_dir = root.join("labels");
    fs::create_dir_all(&labels_dir)?;

    for i in 0..frame_count {
        let frame_id = (i + 1) as u64;
        let lesion = all_lesions || frame_id % 2 == 0;
        let img_name = format!("frame_{frame_id:05}.png");
        let mask_name = format!("frame_{frame_id:05}_mask.png");

        let img = RgbImage::from_fn(8, 8, |x, _y| {
            Rgb([
                (frame_id * 10).min(255) as u8,
                if x < 4 { 0 } else { 255 },
                0,
            ])
        });
        img.save(root.join(&img_name))?;

        let mask = GrayImage::from_fn(8, 8, |x, _y| {
            if lesion && x < 4 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        mask.save(root.join(&mask_name))?;

        let meta = LabelEntry {
            frame_id,
            image: img_name,
            mask: mask_name,
            image_present: true,
            lesion_present: lesion,
            bbox_px: None,
            bbox_norm: lesion.then_some([0.0, 0.0, 0.5, 1.0]),
        };
        let json = serde_json::to_vec(&meta)?;
        fs::write(labels_dir.join(format!("frame_{frame_id:05}.json")), json)?;
    }

    Ok(())
}

fn no_augment() -> AugmentConfig {
    AugmentConfig {
        flip_horizontal_prob: 0.0,
        color_jitter_prob: 0.0,
        noise_prob: 0.0,
        ..Default::default()
    }
}

/// First-pixel red value of sample `i` in an aligned batch.
fn red_of(batch: &mtl_dataset::AlignedBatch, i: usize) -> f32 {
    let stride = (batch.width * batch.height * batch.channels) as usize;
    batch.images[i * stride]
}

#[test]
fn training_draws_stay_aligned_across_modalities() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_synthetic_run(tmp.path(), 8, false)?;

    let spec = SplitSpec {
        val_ratio: 0.25,
        seed: 1,
        ..Default::default()
    };
    let source = CaptureSource::load(tmp.path(), (8, 8), 2, 2, &spec)?;
    assert_eq!(source.num_samples(Split::Train), 6);

    let mut iter = AlignedBatchIter::for_training(&source, no_augment(), Some(7))?;
    for _ in 0..5 {
        let batch = iter.next_aligned()?;
        assert_eq!(batch.len(), 2);
        for i in 0..batch.len() {
            let id = batch.frame_ids[i];
            let expected_red = (id * 10).min(255) as f32 / 255.0;
            assert!(
                (red_of(&batch, i) - expected_red).abs() < 1e-6,
                "image does not belong to frame {id}"
            );
            let expected_label = if id % 2 == 0 { 1.0 } else { 0.0 };
            assert_eq!(batch.labels[i], expected_label);
            if expected_label > 0.5 {
                assert_eq!(batch.boxes[i], [0.0, 0.0, 0.5, 1.0]);
            } else {
                assert_eq!(batch.boxes[i], [0.0; 4]);
            }
        }
    }
    Ok(())
}

#[test]
fn shuffle_reorders_but_never_desynchronizes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_synthetic_run(tmp.path(), 6, false)?;

    let spec = SplitSpec {
        val_ratio: 0.0,
        seed: 1,
        ..Default::default()
    };
    // One block of six samples so the permutation acts within a pull.
    let source = CaptureSource::load(tmp.path(), (8, 8), 6, 6, &spec)?;
    let mut iter = AlignedBatchIter::for_training(&source, no_augment(), Some(11))?;

    let mut orders = Vec::new();
    for _ in 0..4 {
        let batch = iter.next_aligned()?;
        orders.push(batch.frame_ids.clone());
        // Whatever the order, every modality must follow it.
        for i in 0..batch.len() {
            let id = batch.frame_ids[i];
            let expected_red = (id * 10).min(255) as f32 / 255.0;
            assert!((red_of(&batch, i) - expected_red).abs() < 1e-6);
            assert_eq!(batch.labels[i], if id % 2 == 0 { 1.0 } else { 0.0 });
        }
    }
    // Same underlying block every pull, so differing orders mean the
    // per-pull permutation is doing the reordering.
    assert!(
        orders.windows(2).any(|w| w[0] != w[1]),
        "seeded shuffle never produced a reordering"
    );
    Ok(())
}

#[test]
fn validation_passes_draws_through_untouched() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_synthetic_run(tmp.path(), 8, false)?;

    let spec = SplitSpec {
        val_ratio: 0.5,
        seed: 2,
        ..Default::default()
    };
    let source = CaptureSource::load(tmp.path(), (8, 8), 2, 2, &spec)?;
    let mut iter = AlignedBatchIter::for_validation(&source, ValBoxSource::Validation)?;

    let first_cycle: Vec<u64> = (0..2)
        .map(|_| iter.next_aligned().map(|b| b.frame_ids))
        .collect::<DatasetResult<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    let second_cycle: Vec<u64> = (0..2)
        .map(|_| iter.next_aligned().map(|b| b.frame_ids))
        .collect::<DatasetResult<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(
        first_cycle, second_cycle,
        "validation order must be deterministic"
    );

    // No augmentation: the green right-half marker survives.
    let batch = iter.next_aligned()?;
    let stride = (batch.width * batch.height * batch.channels) as usize;
    let plane = (batch.width * batch.height) as usize;
    for i in 0..batch.len() {
        let green_left = batch.images[i * stride + plane];
        let green_right = batch.images[i * stride + plane + 7];
        assert_eq!(green_left, 0.0);
        assert_eq!(green_right, 1.0);
    }
    Ok(())
}

#[test]
fn forced_flip_moves_image_mask_and_bbox_together() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_synthetic_run(tmp.path(), 4, true)?;

    let spec = SplitSpec {
        val_ratio: 0.0,
        seed: 0,
        ..Default::default()
    };
    let source = CaptureSource::load(tmp.path(), (8, 8), 4, 4, &spec)?;
    let augment = AugmentConfig {
        flip_horizontal_prob: 1.0,
        color_jitter_prob: 0.0,
        noise_prob: 0.0,
        ..Default::default()
    };
    let mut iter = AlignedBatchIter::for_training(&source, augment, Some(5))?;
    let batch = iter.next_aligned()?;

    let stride = (batch.width * batch.height * batch.channels) as usize;
    let plane = (batch.width * batch.height) as usize;
    let mask_stride = plane;
    for i in 0..batch.len() {
        // Green marker flipped from the right half to the left half.
        assert_eq!(batch.images[i * stride + plane], 1.0);
        assert_eq!(batch.images[i * stride + plane + 7], 0.0);
        // Mask flipped with the image.
        assert_eq!(batch.masks[i * mask_stride], 0.0);
        assert_eq!(batch.masks[i * mask_stride + 7], 1.0);
        // Bbox coordinates transformed consistently with the flip.
        let b = batch.boxes[i];
        assert!((b[0] - 0.5).abs() < 1e-6 && (b[2] - 1.0).abs() < 1e-6);
        assert_eq!((b[1], b[3]), (0.0, 1.0));
    }
    Ok(())
}

#[test]
fn empty_split_surfaces_exhaustion() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_synthetic_run(tmp.path(), 4, false)?;

    let spec = SplitSpec {
        val_ratio: 0.0,
        seed: 0,
        ..Default::default()
    };
    let source = CaptureSource::load(tmp.path(), (8, 8), 2, 2, &spec)?;
    let mut iter = AlignedBatchIter::for_validation(&source, ValBoxSource::Validation)?;
    assert!(matches!(
        iter.next_aligned(),
        Err(MtlDatasetError::StreamExhausted { .. })
    ));
    Ok(())
}

/// In-memory source with distinct train and validation bbox streams, for
/// exercising the legacy validation wiring.
struct StubSource {
    val_box_ids: Vec<u64>,
}

impl StubSource {
    const W: u32 = 2;
    const H: u32 = 2;

    fn ids(split: Split) -> Vec<u64> {
        match split {
            Split::Train => vec![1, 2],
            Split::Val => vec![11, 12],
            Split::Test => vec![],
        }
    }

    fn boxes(split: Split) -> Vec<[f32; 4]> {
        match split {
            Split::Train => vec![[0.1, 0.1, 0.2, 0.2], [0.1, 0.1, 0.2, 0.2]],
            Split::Val => vec![[0.7, 0.7, 0.9, 0.9], [0.7, 0.7, 0.9, 0.9]],
            Split::Test => vec![],
        }
    }
}

impl StreamSource for StubSource {
    fn image_stream(&self, split: Split) -> DatasetResult<BlockStream<ImageBlock>> {
        let ids = Self::ids(split);
        let block = ImageBlock {
            data: vec![0.0; ids.len() * (Self::W * Self::H * 3) as usize],
            frame_ids: ids,
            width: Self::W,
            height: Self::H,
            channels: 3,
        };
        Ok(BlockStream::new(vec![block], true, "image"))
    }

    fn mask_stream(&self, split: Split) -> DatasetResult<BlockStream<MaskBlock>> {
        let ids = Self::ids(split);
        let block = MaskBlock {
            data: vec![0.0; ids.len() * (Self::W * Self::H) as usize],
            frame_ids: ids,
            width: Self::W,
            height: Self::H,
        };
        Ok(BlockStream::new(vec![block], true, "mask"))
    }

    fn binary_stream(&self, split: Split) -> DatasetResult<BlockStream<LabelBlock>> {
        let ids = Self::ids(split);
        let block = LabelBlock {
            values: vec![1.0; ids.len()],
            frame_ids: ids,
        };
        Ok(BlockStream::new(vec![block], true, "binary label"))
    }

    fn bbox_stream(&self, split: Split) -> DatasetResult<BlockStream<BoxBlock>> {
        let frame_ids = match split {
            Split::Val => self.val_box_ids.clone(),
            _ => Self::ids(split),
        };
        let block = BoxBlock {
            boxes: Self::boxes(split),
            frame_ids,
        };
        Ok(BlockStream::new(vec![block], true, "bbox"))
    }

    fn num_samples(&self, split: Split) -> usize {
        Self::ids(split).len()
    }
}

#[test]
fn legacy_wiring_draws_validation_boxes_from_the_training_stream() -> anyhow::Result<()> {
    let source = StubSource {
        val_box_ids: vec![11, 12],
    };

    let mut corrected = AlignedBatchIter::for_validation(&source, ValBoxSource::Validation)?;
    let batch = corrected.next_aligned()?;
    assert_eq!(batch.boxes, StubSource::boxes(Split::Val));

    let mut legacy = AlignedBatchIter::for_validation(&source, ValBoxSource::TrainingLegacy)?;
    let batch = legacy.next_aligned()?;
    assert_eq!(batch.boxes, StubSource::boxes(Split::Train));
    assert_eq!(batch.frame_ids, StubSource::ids(Split::Val));
    Ok(())
}

#[test]
fn diverging_box_ids_fail_loudly_on_the_corrected_path() -> anyhow::Result<()> {
    let source = StubSource {
        val_box_ids: vec![99, 100],
    };
    let mut iter = AlignedBatchIter::for_validation(&source, ValBoxSource::Validation)?;
    assert!(matches!(
        iter.next_aligned(),
        Err(MtlDatasetError::Alignment(_))
    ));
    Ok(())
}

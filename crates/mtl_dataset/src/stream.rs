//! Per-modality block streams and their factory boundary.

use crate::capture::load_capture_dir;
use crate::splits::{split_records, SplitSpec};
use crate::types::{
    BoxBlock, DatasetResult, ImageBlock, LabelBlock, MaskBlock, MtlDatasetError, SampleRecord,
    Split,
};
use std::path::Path;

/// A restartable cursor over pre-chunked blocks of one modality. With
/// `repeat` set the stream cycles indefinitely; otherwise running past the
/// last block is an exhaustion error.
#[derive(Debug, Clone)]
pub struct BlockStream<T: Clone> {
    blocks: Vec<T>,
    cursor: usize,
    repeat: bool,
    modality: &'static str,
}

impl<T: Clone> BlockStream<T> {
    pub fn new(blocks: Vec<T>, repeat: bool, modality: &'static str) -> Self {
        Self {
            blocks,
            cursor: 0,
            repeat,
            modality,
        }
    }

    pub fn modality(&self) -> &'static str {
        self.modality
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Advance the cursor and hand out the next block.
    pub fn next_block(&mut self) -> DatasetResult<T> {
        if self.blocks.is_empty() {
            return Err(MtlDatasetError::StreamExhausted {
                modality: self.modality,
            });
        }
        if self.cursor >= self.blocks.len() {
            if self.repeat {
                self.cursor = 0;
            } else {
                return Err(MtlDatasetError::StreamExhausted {
                    modality: self.modality,
                });
            }
        }
        let block = self.blocks[self.cursor].clone();
        self.cursor += 1;
        Ok(block)
    }
}

/// The stream-source boundary: four per-modality factories. Every stream a
/// source hands out for a given split must share one logical sample ordering;
/// index `i` across the four streams refers to the same example.
pub trait StreamSource {
    fn image_stream(&self, split: Split) -> DatasetResult<BlockStream<ImageBlock>>;
    fn mask_stream(&self, split: Split) -> DatasetResult<BlockStream<MaskBlock>>;
    fn binary_stream(&self, split: Split) -> DatasetResult<BlockStream<LabelBlock>>;
    fn bbox_stream(&self, split: Split) -> DatasetResult<BlockStream<BoxBlock>>;
    /// Samples available in the split after batch chunking (partial tail
    /// batches are dropped).
    fn num_samples(&self, split: Split) -> usize;
}

/// Production source: one capture directory, split once at load time, each
/// modality stream a view over the same ordered record list.
pub struct CaptureSource {
    train: Vec<SampleRecord>,
    val: Vec<SampleRecord>,
    test: Vec<SampleRecord>,
    batch_size: usize,
    val_batch_size: usize,
}

impl CaptureSource {
    pub fn load(
        root: &Path,
        geometry: (u32, u32),
        batch_size: usize,
        val_batch_size: usize,
        spec: &SplitSpec,
    ) -> DatasetResult<Self> {
        let records = load_capture_dir(root, geometry)?;
        let (train, val, test) = split_records(records, spec);
        Ok(Self {
            train,
            val,
            test,
            batch_size: batch_size.max(1),
            val_batch_size: val_batch_size.max(1),
        })
    }

    fn records(&self, split: Split) -> &[SampleRecord] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    fn batch(&self, split: Split) -> usize {
        match split {
            Split::Train => self.batch_size,
            Split::Val | Split::Test => self.val_batch_size,
        }
    }

    fn chunks(&self, split: Split) -> impl Iterator<Item = &[SampleRecord]> + '_ {
        self.records(split).chunks_exact(self.batch(split))
    }
}

impl StreamSource for CaptureSource {
    fn image_stream(&self, split: Split) -> DatasetResult<BlockStream<ImageBlock>> {
        let blocks = self.chunks(split).map(image_block).collect();
        Ok(BlockStream::new(blocks, true, "image"))
    }

    fn mask_stream(&self, split: Split) -> DatasetResult<BlockStream<MaskBlock>> {
        let blocks = self.chunks(split).map(mask_block).collect();
        Ok(BlockStream::new(blocks, true, "mask"))
    }

    fn binary_stream(&self, split: Split) -> DatasetResult<BlockStream<LabelBlock>> {
        let blocks = self.chunks(split).map(label_block).collect();
        Ok(BlockStream::new(blocks, true, "binary label"))
    }

    fn bbox_stream(&self, split: Split) -> DatasetResult<BlockStream<BoxBlock>> {
        let blocks = self.chunks(split).map(box_block).collect();
        Ok(BlockStream::new(blocks, true, "bbox"))
    }

    fn num_samples(&self, split: Split) -> usize {
        let batch = self.batch(split);
        (self.records(split).len() / batch) * batch
    }
}

fn image_block(records: &[SampleRecord]) -> ImageBlock {
    let (width, height) = (records[0].width, records[0].height);
    let mut data = Vec::with_capacity(records.len() * (width * height * 3) as usize);
    let mut frame_ids = Vec::with_capacity(records.len());
    for r in records {
        frame_ids.push(r.frame_id);
        data.extend_from_slice(&r.image_chw);
    }
    ImageBlock {
        frame_ids,
        data,
        width,
        height,
        channels: 3,
    }
}

fn mask_block(records: &[SampleRecord]) -> MaskBlock {
    let (width, height) = (records[0].width, records[0].height);
    let mut data = Vec::with_capacity(records.len() * (width * height) as usize);
    let mut frame_ids = Vec::with_capacity(records.len());
    for r in records {
        frame_ids.push(r.frame_id);
        data.extend_from_slice(&r.mask);
    }
    MaskBlock {
        frame_ids,
        data,
        width,
        height,
    }
}

fn label_block(records: &[SampleRecord]) -> LabelBlock {
    LabelBlock {
        frame_ids: records.iter().map(|r| r.frame_id).collect(),
        values: records.iter().map(|r| r.label).collect(),
    }
}

fn box_block(records: &[SampleRecord]) -> BoxBlock {
    BoxBlock {
        frame_ids: records.iter().map(|r| r.frame_id).collect(),
        boxes: records.iter().map(|r| r.bbox).collect(),
    }
}

#[cfg(test)]
mod stream_tests {
    use super::BlockStream;
    use crate::types::MtlDatasetError;

    #[test]
    fn repeating_stream_cycles() {
        let mut s = BlockStream::new(vec![1u32, 2, 3], true, "test");
        let pulled: Vec<u32> = (0..7).map(|_| s.next_block().unwrap()).collect();
        assert_eq!(pulled, vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn non_repeating_stream_exhausts() {
        let mut s = BlockStream::new(vec![1u32], false, "test");
        assert_eq!(s.next_block().unwrap(), 1);
        assert!(matches!(
            s.next_block(),
            Err(MtlDatasetError::StreamExhausted { modality: "test" })
        ));
    }
}

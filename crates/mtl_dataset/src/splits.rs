//! Deterministic train/val/test partitioning with optional k-fold selection.

use crate::types::SampleRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// How to partition the loaded records. With `folds >= 2` the validation set
/// is the `fold`-th of `folds` contiguous chunks (cross-validation); otherwise
/// a plain `val_ratio` holdout is taken from the tail. An optional test
/// fraction is carved off first and never touches train/val.
#[derive(Debug, Clone)]
pub struct SplitSpec {
    pub val_ratio: f32,
    pub test_ratio: f32,
    pub folds: usize,
    pub fold: usize,
    pub seed: u64,
}

impl Default for SplitSpec {
    fn default() -> Self {
        Self {
            val_ratio: 0.2,
            test_ratio: 0.0,
            folds: 0,
            fold: 0,
            seed: 0,
        }
    }
}

/// Shuffle deterministically, then partition into (train, val, test).
pub fn split_records(
    mut records: Vec<SampleRecord>,
    spec: &SplitSpec,
) -> (Vec<SampleRecord>, Vec<SampleRecord>, Vec<SampleRecord>) {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    records.shuffle(&mut rng);

    let total = records.len();
    let test_len = (total as f32 * spec.test_ratio.clamp(0.0, 1.0)).round() as usize;
    let test = records.split_off(total - test_len.min(total));

    let remaining = records.len();
    if spec.folds >= 2 {
        let fold = spec.fold % spec.folds;
        let fold_len = remaining / spec.folds;
        let start = fold * fold_len;
        // Last fold absorbs the remainder.
        let end = if fold + 1 == spec.folds {
            remaining
        } else {
            start + fold_len
        };
        let mut train = records;
        let val: Vec<SampleRecord> = train.drain(start..end).collect();
        (train, val, test)
    } else {
        let val_len = (remaining as f32 * spec.val_ratio.clamp(0.0, 1.0)).round() as usize;
        let val = records.split_off(remaining - val_len.min(remaining));
        (records, val, test)
    }
}

#[cfg(test)]
mod splits_tests {
    use super::{split_records, SplitSpec};
    use crate::types::SampleRecord;

    fn records(n: usize) -> Vec<SampleRecord> {
        (0..n)
            .map(|i| SampleRecord {
                frame_id: i as u64,
                image_chw: vec![0.0; 12],
                mask: vec![0.0; 4],
                label: 0.0,
                bbox: [0.0; 4],
                width: 2,
                height: 2,
            })
            .collect()
    }

    #[test]
    fn ratio_holdout_partitions_all_records() {
        let spec = SplitSpec {
            val_ratio: 0.25,
            ..Default::default()
        };
        let (train, val, test) = split_records(records(20), &spec);
        assert_eq!(train.len(), 15);
        assert_eq!(val.len(), 5);
        assert!(test.is_empty());
    }

    #[test]
    fn split_is_deterministic_for_a_seed() {
        let spec = SplitSpec {
            seed: 7,
            ..Default::default()
        };
        let (a, _, _) = split_records(records(16), &spec);
        let (b, _, _) = split_records(records(16), &spec);
        let ids_a: Vec<u64> = a.iter().map(|r| r.frame_id).collect();
        let ids_b: Vec<u64> = b.iter().map(|r| r.frame_id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn folds_cover_disjoint_validation_sets() {
        let mut seen = Vec::new();
        for fold in 0..4 {
            let spec = SplitSpec {
                folds: 4,
                fold,
                seed: 3,
                ..Default::default()
            };
            let (_, val, _) = split_records(records(16), &spec);
            assert_eq!(val.len(), 4);
            seen.extend(val.iter().map(|r| r.frame_id));
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 16, "folds must tile the dataset");
    }
}

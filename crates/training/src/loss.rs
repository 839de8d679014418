//! Multi-task loss composition and per-head metrics.

use burn::tensor::activation::sigmoid;
use burn::tensor::{backend::Backend, Tensor};

/// Per-output loss weights. Bbox is down-weighted to compensate for MAE's
/// larger native range relative to the two cross-entropy losses.
#[derive(Debug, Clone)]
pub struct LossWeights {
    pub seg: f32,
    pub cls: f32,
    pub bbox: f32,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            seg: 1.0,
            cls: 1.0,
            bbox: 1.0 / 100.0,
        }
    }
}

/// Binary cross-entropy over per-pixel logits.
pub fn binary_cross_entropy_from_logits<B: Backend>(
    logits: Tensor<B, 4>,
    targets: Tensor<B, 4>,
) -> Tensor<B, 1> {
    bce_mean(sigmoid(logits), targets)
}

/// Binary cross-entropy over probabilities.
pub fn binary_cross_entropy<B: Backend>(
    probs: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    bce_mean(probs, targets)
}

fn bce_mean<B: Backend, const D: usize>(
    probs: Tensor<B, D>,
    targets: Tensor<B, D>,
) -> Tensor<B, 1> {
    let eps = 1e-6;
    let count = probs.dims().iter().product::<usize>() as f32;
    let probs = probs.clamp(eps, 1.0 - eps);
    let targets_inv =
        Tensor::<B, D>::ones(targets.dims(), &targets.device()) - targets.clone();
    let probs_inv =
        Tensor::<B, D>::ones(probs.dims(), &probs.device()) - probs.clone();
    -((targets * probs.log()) + (targets_inv * probs_inv.log()))
        .sum()
        .div_scalar(count)
}

pub fn mean_absolute_error<B: Backend>(pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    let count = pred.dims().iter().product::<usize>() as f32;
    (pred - target).abs().sum().div_scalar(count)
}

/// The multi-task total: `w_seg * seg + w_cls * cls + w_bbox * bbox`.
pub fn weighted_total<B: Backend>(
    seg: Tensor<B, 1>,
    cls: Tensor<B, 1>,
    bbox: Tensor<B, 1>,
    weights: &LossWeights,
) -> Tensor<B, 1> {
    seg.mul_scalar(weights.seg) + cls.mul_scalar(weights.cls) + bbox.mul_scalar(weights.bbox)
}

/// First element of a rank-1 tensor as f32.
pub fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(0.0)
}

/// Fraction of pixels where the thresholded logit matches the mask.
pub fn segmentation_accuracy<B: Backend>(logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> f32 {
    let preds = to_vec(logits);
    let targets = to_vec(targets);
    binary_match_rate(&preds, &targets, 0.0)
}

/// Fraction of samples where the rounded probability matches the label.
pub fn classification_accuracy<B: Backend>(probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> f32 {
    let preds = to_vec(probs);
    let targets = to_vec(targets);
    binary_match_rate(&preds, &targets, 0.5)
}

fn binary_match_rate(preds: &[f32], targets: &[f32], threshold: f32) -> f32 {
    if preds.is_empty() || preds.len() != targets.len() {
        return 0.0;
    }
    let matches = preds
        .iter()
        .zip(targets.iter())
        .filter(|(p, t)| (**p >= threshold) == (**t >= 0.5))
        .count();
    matches as f32 / preds.len() as f32
}

/// Mean IoU between predicted and target boxes, [batch, 4] each.
pub fn mean_iou<B: Backend>(pred: Tensor<B, 2>, target: Tensor<B, 2>) -> f32 {
    let pred = to_vec(pred);
    let target = to_vec(target);
    let n = pred.len() / 4;
    if n == 0 || pred.len() != target.len() {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..n {
        let a = [pred[i * 4], pred[i * 4 + 1], pred[i * 4 + 2], pred[i * 4 + 3]];
        let b = [
            target[i * 4],
            target[i * 4 + 1],
            target[i * 4 + 2],
            target[i * 4 + 3],
        ];
        total += iou_xyxy(a, b);
    }
    total / n as f32
}

pub fn iou_xyxy(a: [f32; 4], b: [f32; 4]) -> f32 {
    let ax0 = a[0].min(a[2]);
    let ay0 = a[1].min(a[3]);
    let ax1 = a[0].max(a[2]);
    let ay1 = a[1].max(a[3]);
    let bx0 = b[0].min(b[2]);
    let by0 = b[1].min(b[3]);
    let bx1 = b[0].max(b[2]);
    let by1 = b[1].max(b[3]);

    let inter_x0 = ax0.max(bx0);
    let inter_y0 = ay0.max(by0);
    let inter_x1 = ax1.min(bx1);
    let inter_y1 = ay1.min(by1);

    let inter_w = (inter_x1 - inter_x0).max(0.0);
    let inter_h = (inter_y1 - inter_y0).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = (ax1 - ax0).max(0.0) * (ay1 - ay0).max(0.0);
    let area_b = (bx1 - bx0).max(0.0) * (by1 - by0).max(0.0);
    let denom = area_a + area_b - inter_area;
    if denom <= 0.0 {
        0.0
    } else {
        inter_area / denom
    }
}

fn to_vec<B: Backend, const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().unwrap_or_default()
}

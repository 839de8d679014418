//! The two-phase training controller.
//!
//! Strictly sequential, non-resumable: an initial full-rate phase, an
//! unconditional transition, then a fine-tune phase at a reduced learning
//! rate. The same model instance flows through both phases; each phase gets a
//! fresh optimizer, fresh generator instances, and its own log destination.

use crate::collate::{collate, MtlBatch};
use crate::history::{phase_log_path, EpochMetrics, MetricsLogger, TrainPhase, TrainingHistory};
use crate::loss::{
    binary_cross_entropy, binary_cross_entropy_from_logits, classification_accuracy,
    mean_absolute_error, mean_iou, scalar, segmentation_accuracy, weighted_total, LossWeights,
};
use crate::TrainBackend;
use burn::backend::Autodiff;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::Tensor;
use models::{MtlModel, MtlOutput, BBOX_OUT, BIN_CLASS_OUT, SEGNET_OUT};
use mtl_dataset::{AlignedBatchIter, AugmentConfig, Split, StreamSource, ValBoxSource};
use std::path::PathBuf;

pub type ADBackend = Autodiff<TrainBackend>;

/// Every run parameter, made explicit. Defaults are the production schedule:
/// batch sizes 16/16, epoch budgets 15/10, fine-tune rate 1e-4, loss weights
/// [1, 1, 1/100].
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub train_batch_size: usize,
    pub val_batch_size: usize,
    pub phase1_epochs: usize,
    pub phase2_epochs: usize,
    pub base_learning_rate: f64,
    pub fine_tune_learning_rate: f64,
    pub loss_weights: LossWeights,
    pub augment: AugmentConfig,
    pub seed: Option<u64>,
    pub val_box_source: ValBoxSource,
    pub log_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_batch_size: 16,
            val_batch_size: 16,
            phase1_epochs: 15,
            phase2_epochs: 10,
            base_learning_rate: 1e-3,
            fine_tune_learning_rate: 1e-4,
            loss_weights: LossWeights::default(),
            augment: AugmentConfig::default(),
            seed: None,
            val_box_source: ValBoxSource::default(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Training steps per epoch: `⌊num_samples / batch_size⌋`.
pub fn steps_per_epoch(num_samples: usize, batch_size: usize) -> usize {
    num_samples / batch_size.max(1)
}

#[derive(Debug)]
pub struct TwoPhaseOutcome {
    pub model: MtlModel<ADBackend>,
    pub initial: TrainingHistory,
    pub fine_tune: TrainingHistory,
}

/// Run both phases. Fails before any training if the loss configuration
/// names an output the model does not produce; fails during a phase on any
/// stream or step error (fatal, no retry, metrics of the phase are lost).
pub fn run_two_phase<S: StreamSource>(
    model: MtlModel<ADBackend>,
    source: &S,
    cfg: &TrainConfig,
) -> anyhow::Result<TwoPhaseOutcome> {
    validate_loss_wiring(&model)?;

    let (model, initial) = run_phase(
        model,
        source,
        cfg,
        TrainPhase::Initial,
        cfg.phase1_epochs,
        cfg.base_learning_rate,
    )?;
    // Unconditional transition: no convergence check, no checkpoint
    // selection. Weights carry over; the optimizer does not.
    let (model, fine_tune) = run_phase(
        model,
        source,
        cfg,
        TrainPhase::FineTune,
        cfg.phase2_epochs,
        cfg.fine_tune_learning_rate,
    )?;

    Ok(TwoPhaseOutcome {
        model,
        initial,
        fine_tune,
    })
}

/// The loss map weights exactly these three outputs; a model missing one is
/// a configuration error surfaced before any training occurs.
fn validate_loss_wiring(model: &MtlModel<ADBackend>) -> anyhow::Result<()> {
    for name in [SEGNET_OUT, BIN_CLASS_OUT, BBOX_OUT] {
        if !model.has_output(name) {
            anyhow::bail!(
                "loss is weighted for output `{name}` but the model does not produce it \
                 (built outputs: {})",
                model.output_names().join(", ")
            );
        }
    }
    Ok(())
}

fn run_phase<S: StreamSource>(
    mut model: MtlModel<ADBackend>,
    source: &S,
    cfg: &TrainConfig,
    phase: TrainPhase,
    epochs: usize,
    lr: f64,
) -> anyhow::Result<(MtlModel<ADBackend>, TrainingHistory)> {
    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();

    let num_train = source.num_samples(Split::Train);
    let num_val = source.num_samples(Split::Val);
    let train_steps = steps_per_epoch(num_train, cfg.train_batch_size);
    let val_steps = steps_per_epoch(num_val, cfg.val_batch_size);
    anyhow::ensure!(
        train_steps > 0,
        "not enough training samples ({num_train}) for one batch of {}",
        cfg.train_batch_size
    );

    let mut train_iter = AlignedBatchIter::for_training(source, cfg.augment.clone(), cfg.seed)?;
    let mut val_iter = AlignedBatchIter::for_validation(source, cfg.val_box_source)?;
    let mut optim = AdamConfig::new().init();
    let mut logger = MetricsLogger::create(&phase_log_path(&cfg.log_dir, phase))?;
    let mut history = TrainingHistory::default();

    println!(
        "[{}] {} epochs x {} steps (val {} steps), lr {lr}",
        phase.label(),
        epochs,
        train_steps,
        val_steps
    );

    for epoch in 0..epochs {
        let mut train_acc = RunningMeans::default();
        for _ in 0..train_steps {
            let batch = train_iter.next_aligned()?;
            let batch = collate::<ADBackend>(&batch, &device)?;
            let (step, total) = forward_losses(&model, &batch, &cfg.loss_weights)?;
            let grads = GradientsParams::from_grads(total.backward(), &model);
            model = optim.step(lr, model, grads);
            train_acc.add(&step);
        }

        let mut val_acc = RunningMeans::default();
        for _ in 0..val_steps {
            let batch = val_iter.next_aligned()?;
            let batch = collate::<ADBackend>(&batch, &device)?;
            let (step, _total) = forward_losses(&model, &batch, &cfg.loss_weights)?;
            val_acc.add(&step);
        }

        let metrics = epoch_metrics(epoch, lr, &train_acc, &val_acc);
        println!(
            "[{}] epoch {}/{}: loss {:.4} val_loss {:.4}",
            phase.label(),
            epoch + 1,
            epochs,
            metrics.loss,
            metrics.val_loss
        );
        logger.append(&metrics)?;
        history.epochs.push(metrics);
    }

    Ok((model, history))
}

/// Scalar metrics of one forward pass.
#[derive(Debug, Clone, Copy, Default)]
struct StepScalars {
    loss: f32,
    seg_loss: f32,
    seg_acc: f32,
    cls_loss: f32,
    cls_acc: f32,
    bbox_loss: f32,
    bbox_iou: f32,
}

fn forward_losses(
    model: &MtlModel<ADBackend>,
    batch: &MtlBatch<ADBackend>,
    weights: &LossWeights,
) -> anyhow::Result<(StepScalars, Tensor<ADBackend, 1>)> {
    let out = model.forward(batch.images.clone());
    let (seg, cls, bbox) = required_outputs(out)?;

    let seg_loss = binary_cross_entropy_from_logits(seg.clone(), batch.masks.clone());
    let cls_loss = binary_cross_entropy(cls.clone(), batch.labels.clone());
    let bbox_loss = mean_absolute_error(bbox.clone(), batch.boxes.clone());
    let total = weighted_total(
        seg_loss.clone(),
        cls_loss.clone(),
        bbox_loss.clone(),
        weights,
    );

    let step = StepScalars {
        loss: scalar(total.clone().detach()),
        seg_loss: scalar(seg_loss.detach()),
        seg_acc: segmentation_accuracy(seg.detach(), batch.masks.clone().detach()),
        cls_loss: scalar(cls_loss.detach()),
        cls_acc: classification_accuracy(cls.detach(), batch.labels.clone().detach()),
        bbox_loss: scalar(bbox_loss.detach()),
        bbox_iou: mean_iou(bbox.detach(), batch.boxes.clone().detach()),
    };
    Ok((step, total))
}

fn required_outputs(
    out: MtlOutput<ADBackend>,
) -> anyhow::Result<(
    Tensor<ADBackend, 4>,
    Tensor<ADBackend, 2>,
    Tensor<ADBackend, 2>,
)> {
    let seg = out
        .segnet_out
        .ok_or_else(|| anyhow::anyhow!("model produced no {SEGNET_OUT} output"))?;
    let cls = out
        .bin_class_out
        .ok_or_else(|| anyhow::anyhow!("model produced no {BIN_CLASS_OUT} output"))?;
    let bbox = out
        .bbox_out
        .ok_or_else(|| anyhow::anyhow!("model produced no {BBOX_OUT} output"))?;
    Ok((seg, cls, bbox))
}

#[derive(Debug, Default)]
struct RunningMeans {
    n: f32,
    sums: StepScalars,
}

impl RunningMeans {
    fn add(&mut self, step: &StepScalars) {
        self.n += 1.0;
        self.sums.loss += step.loss;
        self.sums.seg_loss += step.seg_loss;
        self.sums.seg_acc += step.seg_acc;
        self.sums.cls_loss += step.cls_loss;
        self.sums.cls_acc += step.cls_acc;
        self.sums.bbox_loss += step.bbox_loss;
        self.sums.bbox_iou += step.bbox_iou;
    }

    fn mean(&self) -> StepScalars {
        if self.n == 0.0 {
            return StepScalars::default();
        }
        StepScalars {
            loss: self.sums.loss / self.n,
            seg_loss: self.sums.seg_loss / self.n,
            seg_acc: self.sums.seg_acc / self.n,
            cls_loss: self.sums.cls_loss / self.n,
            cls_acc: self.sums.cls_acc / self.n,
            bbox_loss: self.sums.bbox_loss / self.n,
            bbox_iou: self.sums.bbox_iou / self.n,
        }
    }
}

fn epoch_metrics(epoch: usize, lr: f64, train: &RunningMeans, val: &RunningMeans) -> EpochMetrics {
    let t = train.mean();
    let v = val.mean();
    EpochMetrics {
        epoch,
        loss: t.loss,
        segnet_out_loss: t.seg_loss,
        segnet_out_accuracy: t.seg_acc,
        bin_class_out_loss: t.cls_loss,
        bin_class_out_accuracy: t.cls_acc,
        bbox_out_loss: t.bbox_loss,
        bbox_out_accuracy: t.bbox_iou,
        val_loss: v.loss,
        val_segnet_out_loss: v.seg_loss,
        val_segnet_out_accuracy: v.seg_acc,
        val_bin_class_out_loss: v.cls_loss,
        val_bin_class_out_accuracy: v.cls_acc,
        val_bbox_out_loss: v.bbox_loss,
        val_bbox_out_accuracy: v.bbox_iou,
        lr,
    }
}

#[cfg(test)]
mod controller_tests {
    use super::steps_per_epoch;

    #[test]
    fn step_budget_is_floor_of_samples_over_batch() {
        assert_eq!(steps_per_epoch(1600, 16), 100);
        assert_eq!(steps_per_epoch(160, 16), 10);
        assert_eq!(steps_per_epoch(15, 16), 0);
    }

    #[test]
    fn zero_batch_size_does_not_divide_by_zero() {
        assert_eq!(steps_per_epoch(100, 0), 100);
    }
}

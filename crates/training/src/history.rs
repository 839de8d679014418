//! Per-epoch metric records, the history they accumulate into, and the CSV
//! log sink. Each training phase logs to its own deterministic path and
//! overwrites whatever was there from a previous run.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// Which training phase a log destination belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainPhase {
    Initial,
    FineTune,
}

impl TrainPhase {
    pub fn log_file(&self) -> &'static str {
        match self {
            TrainPhase::Initial => "mtl_training_log.csv",
            TrainPhase::FineTune => "mtl_fine_tune_log.csv",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrainPhase::Initial => "initial",
            TrainPhase::FineTune => "fine-tune",
        }
    }
}

pub fn phase_log_path(log_dir: &Path, phase: TrainPhase) -> PathBuf {
    log_dir.join(phase.log_file())
}

pub const METRIC_COLUMNS: [&str; 16] = [
    "epoch",
    "loss",
    "segnet_out_loss",
    "segnet_out_accuracy",
    "bin_class_out_loss",
    "bin_class_out_accuracy",
    "bbox_out_loss",
    "bbox_out_accuracy",
    "val_loss",
    "val_segnet_out_loss",
    "val_segnet_out_accuracy",
    "val_bin_class_out_loss",
    "val_bin_class_out_accuracy",
    "val_bbox_out_loss",
    "val_bbox_out_accuracy",
    "lr",
];

/// One epoch's scalar metrics for every output head. `bbox_out_accuracy`
/// reports mean IoU.
#[derive(Debug, Clone, Default)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub segnet_out_loss: f32,
    pub segnet_out_accuracy: f32,
    pub bin_class_out_loss: f32,
    pub bin_class_out_accuracy: f32,
    pub bbox_out_loss: f32,
    pub bbox_out_accuracy: f32,
    pub val_loss: f32,
    pub val_segnet_out_loss: f32,
    pub val_segnet_out_accuracy: f32,
    pub val_bin_class_out_loss: f32,
    pub val_bin_class_out_accuracy: f32,
    pub val_bbox_out_loss: f32,
    pub val_bbox_out_accuracy: f32,
    pub lr: f64,
}

impl EpochMetrics {
    /// Look a metric up by its history key (e.g. `val_segnet_out_accuracy`).
    pub fn get(&self, key: &str) -> Option<f32> {
        match key {
            "loss" => Some(self.loss),
            "segnet_out_loss" => Some(self.segnet_out_loss),
            "segnet_out_accuracy" => Some(self.segnet_out_accuracy),
            "bin_class_out_loss" => Some(self.bin_class_out_loss),
            "bin_class_out_accuracy" => Some(self.bin_class_out_accuracy),
            "bbox_out_loss" => Some(self.bbox_out_loss),
            "bbox_out_accuracy" => Some(self.bbox_out_accuracy),
            "val_loss" => Some(self.val_loss),
            "val_segnet_out_loss" => Some(self.val_segnet_out_loss),
            "val_segnet_out_accuracy" => Some(self.val_segnet_out_accuracy),
            "val_bin_class_out_loss" => Some(self.val_bin_class_out_loss),
            "val_bin_class_out_accuracy" => Some(self.val_bin_class_out_accuracy),
            "val_bbox_out_loss" => Some(self.val_bbox_out_loss),
            "val_bbox_out_accuracy" => Some(self.val_bbox_out_accuracy),
            _ => None,
        }
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.epoch.to_string(),
            self.loss.to_string(),
            self.segnet_out_loss.to_string(),
            self.segnet_out_accuracy.to_string(),
            self.bin_class_out_loss.to_string(),
            self.bin_class_out_accuracy.to_string(),
            self.bbox_out_loss.to_string(),
            self.bbox_out_accuracy.to_string(),
            self.val_loss.to_string(),
            self.val_segnet_out_loss.to_string(),
            self.val_segnet_out_accuracy.to_string(),
            self.val_bin_class_out_loss.to_string(),
            self.val_bin_class_out_accuracy.to_string(),
            self.val_bbox_out_loss.to_string(),
            self.val_bbox_out_accuracy.to_string(),
            self.lr.to_string(),
        ]
    }
}

/// Metrics history for one phase, keyed like the fit contract expects.
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Per-epoch series for a metric key, or None for an unknown key.
    pub fn series(&self, key: &str) -> Option<Vec<f32>> {
        self.epochs.iter().map(|e| e.get(key)).collect()
    }
}

/// CSV sink for one phase. Creating the logger truncates any previous log at
/// the same path; every appended epoch is flushed so a fatal step loses at
/// most the current epoch.
pub struct MetricsLogger {
    writer: csv::Writer<fs::File>,
}

impl MetricsLogger {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to open metrics log {}", path.display()))?;
        writer.write_record(METRIC_COLUMNS)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    pub fn append(&mut self, metrics: &EpochMetrics) -> anyhow::Result<()> {
        self.writer.write_record(metrics.row())?;
        self.writer.flush()?;
        Ok(())
    }
}

#![recursion_limit = "256"]

pub mod collate;
pub mod controller;
pub mod history;
pub mod loss;

pub use collate::{collate, MtlBatch};
pub use controller::{run_two_phase, steps_per_epoch, ADBackend, TrainConfig, TwoPhaseOutcome};
pub use history::{
    phase_log_path, EpochMetrics, MetricsLogger, TrainPhase, TrainingHistory, METRIC_COLUMNS,
};
pub use loss::LossWeights;
/// Backend alias for training (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

use anyhow::Context;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use clap::{Parser, ValueEnum};
use models::{Encoder, EncoderConfig, EncoderVariant, MtlBuilder};
use mtl_dataset::{AugmentConfig, CaptureSource, Split, SplitSpec, StreamSource, ValBoxSource};
use std::fs;
use std::path::{Path, PathBuf};
use training::{run_two_phase, ADBackend, LossWeights, TrainConfig};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum EncoderArg {
    B0,
    B1,
    B2,
}

impl From<EncoderArg> for EncoderVariant {
    fn from(arg: EncoderArg) -> Self {
        match arg {
            EncoderArg::B0 => EncoderVariant::B0,
            EncoderArg::B1 => EncoderVariant::B1,
            EncoderArg::B2 => EncoderVariant::B2,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Two-phase multi-task training: segmentation + presence classification + bbox regression"
)]
struct Args {
    /// Capture dataset root containing labels/ plus image and mask files.
    #[arg(long, default_value = "assets/datasets/captures")]
    dataset_root: String,
    /// Directory receiving the per-phase CSV metric logs.
    #[arg(long, default_value = "logs")]
    log_dir: String,
    /// Encoder variant (selects trunk and head widths).
    #[arg(long, value_enum, default_value_t = EncoderArg::B0)]
    encoder: EncoderArg,
    /// Input height (must be divisible by 8).
    #[arg(long, default_value_t = 128)]
    img_height: usize,
    /// Input width (must be divisible by 8).
    #[arg(long, default_value_t = 128)]
    img_width: usize,
    /// Training batch size.
    #[arg(long, default_value_t = 16)]
    train_batch_size: usize,
    /// Validation batch size.
    #[arg(long, default_value_t = 16)]
    val_batch_size: usize,
    /// Epoch budget for the initial phase.
    #[arg(long, default_value_t = 15)]
    phase1_epochs: usize,
    /// Epoch budget for the fine-tune phase.
    #[arg(long, default_value_t = 10)]
    phase2_epochs: usize,
    /// Learning rate for the initial phase.
    #[arg(long, default_value_t = 1e-3)]
    base_lr: f64,
    /// Reduced learning rate for the fine-tune phase.
    #[arg(long, default_value_t = 1e-4)]
    fine_tune_lr: f64,
    /// Loss weight for the segmentation output.
    #[arg(long, default_value_t = 1.0)]
    seg_weight: f32,
    /// Loss weight for the classification output.
    #[arg(long, default_value_t = 1.0)]
    cls_weight: f32,
    /// Loss weight for the bbox output (down-weighted to the BCE range).
    #[arg(long, default_value_t = 0.01)]
    bbox_weight: f32,
    /// Validation holdout fraction (ignored when --folds >= 2).
    #[arg(long, default_value_t = 0.2)]
    val_ratio: f32,
    /// Test fraction carved off before the train/val split.
    #[arg(long, default_value_t = 0.0)]
    test_ratio: f32,
    /// Number of cross-validation folds (0 or 1 disables folding).
    #[arg(long, default_value_t = 0)]
    folds: usize,
    /// Which fold serves as validation when folding.
    #[arg(long, default_value_t = 0)]
    fold: usize,
    /// Seed for splitting, shuffling and augmentation.
    #[arg(long)]
    seed: Option<u64>,
    /// Probability of the joint horizontal flip.
    #[arg(long, default_value_t = 0.5)]
    flip_prob: f32,
    /// Probability of the photometric jitter.
    #[arg(long, default_value_t = 0.2)]
    jitter_prob: f32,
    /// Reproduce the legacy wiring: validation bboxes drawn from the
    /// training stream.
    #[arg(long)]
    legacy_val_boxes: bool,
    /// Keep the classification head's weights frozen.
    #[arg(long)]
    freeze_classification_head: bool,
    /// Keep the bbox head's weights frozen.
    #[arg(long)]
    freeze_box_head: bool,
    /// Keep the encoder's weights frozen.
    #[arg(long)]
    freeze_encoder: bool,
    /// Checkpoint output path.
    #[arg(long, default_value = "checkpoints/mtl_lesion.bin")]
    checkpoint_out: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let variant = EncoderVariant::from(args.encoder);

    let spec = SplitSpec {
        val_ratio: args.val_ratio,
        test_ratio: args.test_ratio,
        folds: args.folds,
        fold: args.fold,
        seed: args.seed.unwrap_or(0),
    };
    let source = CaptureSource::load(
        Path::new(&args.dataset_root),
        (args.img_width as u32, args.img_height as u32),
        args.train_batch_size,
        args.val_batch_size,
        &spec,
    )
    .with_context(|| format!("failed to load dataset from {}", args.dataset_root))?;
    println!(
        "[dataset] {} train / {} val samples from {}",
        source.num_samples(Split::Train),
        source.num_samples(Split::Val),
        args.dataset_root
    );

    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let enc_cfg = EncoderConfig {
        variant,
        input: (args.img_height, args.img_width, 3),
    };
    println!("{}", enc_cfg.describe());
    let encoder = Encoder::<ADBackend>::new(&enc_cfg, !args.freeze_encoder, &device);

    let mut builder = MtlBuilder::new(encoder, enc_cfg.input, &device)?;
    builder.add_segmentation_head();
    builder.add_binary_classification_head(variant, !args.freeze_classification_head);
    builder.add_bbox_regression_head(variant, !args.freeze_box_head);
    let model = builder.build()?;
    println!("{}", model.describe());

    let cfg = TrainConfig {
        train_batch_size: args.train_batch_size,
        val_batch_size: args.val_batch_size,
        phase1_epochs: args.phase1_epochs,
        phase2_epochs: args.phase2_epochs,
        base_learning_rate: args.base_lr,
        fine_tune_learning_rate: args.fine_tune_lr,
        loss_weights: LossWeights {
            seg: args.seg_weight,
            cls: args.cls_weight,
            bbox: args.bbox_weight,
        },
        augment: AugmentConfig {
            flip_horizontal_prob: args.flip_prob,
            color_jitter_prob: args.jitter_prob,
            ..Default::default()
        },
        seed: args.seed,
        val_box_source: if args.legacy_val_boxes {
            ValBoxSource::TrainingLegacy
        } else {
            ValBoxSource::Validation
        },
        log_dir: PathBuf::from(&args.log_dir),
    };

    let outcome = run_two_phase(model, &source, &cfg)?;

    let ckpt_path = Path::new(&args.checkpoint_out);
    if let Some(parent) = ckpt_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    outcome
        .model
        .clone()
        .save_file(ckpt_path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;
    println!("Saved checkpoint to {}", args.checkpoint_out);

    Ok(())
}

// ============================================================
// Layer 1: CLI Commands and Arguments
// ============================================================
// Defines the subcommands `train`, `evaluate` and `predict`
// and all their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::{evaluate_use_case::EvaluateConfig, train_use_case::TrainConfig};
use crate::domain::labels::{IGNORE_INDEX, NUM_TRAIN_CLASSES};
use crate::ml::{backbone::BackboneKind, backend::BackendKind, model::ModelKind};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a segmentation model on a Cityscapes-style dataset
    Train(TrainArgs),

    /// Evaluate the best checkpoint and export a CSV report
    Evaluate(EvaluateArgs),

    /// Segment a single image with the best checkpoint
    Predict(PredictArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON file with a complete training config; when given, the
    /// flags below are ignored
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long, value_enum, default_value_t = ModelKind::UNet)]
    pub model: ModelKind,

    /// Feature extractor for the DeepLab variants
    #[arg(long, value_enum, default_value_t = BackboneKind::ResNet101)]
    pub backbone: BackboneKind,

    /// Backbone output stride (8 or 16)
    #[arg(long, default_value_t = 16)]
    pub output_stride: usize,

    #[arg(long, default_value_t = NUM_TRAIN_CLASSES)]
    pub num_classes: usize,

    /// Label value excluded from loss and IoU
    #[arg(long, default_value_t = IGNORE_INDEX)]
    pub ignore_index: u8,

    /// Root containing leftImg8bit/ and gtFine/
    #[arg(long, default_value = "data/cityscapes")]
    pub data_root: String,

    /// Where checkpoints, config and metric CSVs are written
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Initial Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Floor for the plateau scheduler
    #[arg(long, default_value_t = 1e-4)]
    pub min_lr: f64,

    #[arg(long, default_value_t = 0.1)]
    pub plateau_factor: f64,

    /// Evaluations without improvement before the LR is reduced
    #[arg(long, default_value_t = 10)]
    pub plateau_patience: usize,

    /// Validate every N epochs (the last epoch is always validated)
    #[arg(long, default_value_t = 1)]
    pub eval_every: usize,

    /// Training crop as HEIGHT WIDTH
    #[arg(long, num_args = 2, value_names = ["HEIGHT", "WIDTH"], default_values_t = [512, 1024])]
    pub crop_size: Vec<u32>,

    /// Crop area range as a fraction of the image, MIN MAX
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], default_values_t = [0.25, 1.0])]
    pub crop_scale: Vec<f32>,

    /// Crop aspect-ratio range, MIN MAX
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], default_values_t = [0.75, 4.0 / 3.0])]
    pub crop_ratio: Vec<f32>,

    #[arg(long, default_value_t = 0.5)]
    pub flip_prob: f32,

    /// Resize validation images to HEIGHT WIDTH
    #[arg(long, num_args = 2, value_names = ["HEIGHT", "WIDTH"])]
    pub eval_size: Option<Vec<u32>>,

    /// Load these weights before training if the file exists
    #[arg(long)]
    pub pretrained_weights: Option<String>,

    /// Divide every DeepLab channel count by this (1 = full size)
    #[arg(long, default_value_t = 1)]
    pub width_divisor: usize,

    #[arg(long, default_value_t = 256)]
    pub decoder_channels: usize,

    #[arg(long, default_value_t = 64)]
    pub unet_base_channels: usize,

    /// Data loader worker threads
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

fn pair<T: Copy>(values: &[T], fallback: [T; 2]) -> [T; 2] {
    match values {
        [a, b] => [*a, *b],
        _ => fallback,
    }
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let defaults = TrainConfig::default();
        TrainConfig {
            model:              a.model,
            backbone:           a.backbone,
            output_stride:      a.output_stride,
            num_classes:        a.num_classes,
            ignore_index:       a.ignore_index,
            width_divisor:      a.width_divisor,
            decoder_channels:   a.decoder_channels,
            unet_base_channels: a.unet_base_channels,
            pretrained_weights: a.pretrained_weights,
            data_root:          a.data_root,
            checkpoint_dir:     a.checkpoint_dir,
            batch_size:         a.batch_size,
            epochs:             a.epochs,
            lr:                 a.lr,
            min_lr:             a.min_lr,
            plateau_factor:     a.plateau_factor,
            plateau_patience:   a.plateau_patience,
            eval_every:         a.eval_every,
            crop_size:          pair(&a.crop_size, defaults.crop_size),
            crop_scale:         pair(&a.crop_scale, defaults.crop_scale),
            crop_ratio:         pair(&a.crop_ratio, defaults.crop_ratio),
            flip_prob:          a.flip_prob,
            eval_size:          a.eval_size.map(|v| pair(&v, [0, 0])),
            num_workers:        a.num_workers,
            seed:               a.seed,
            backend:            a.backend,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory written by `train`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Overrides the data root saved with the checkpoint
    #[arg(long)]
    pub data_root: Option<String>,

    #[arg(long, default_value = "val")]
    pub split: String,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub num_workers: Option<usize>,

    /// Where test<YYMMDD_HHMMSS>.csv is written
    #[arg(long, default_value = "csv")]
    pub csv_dir: String,

    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            checkpoint_dir: a.checkpoint_dir,
            data_root:      a.data_root,
            split:          a.split,
            batch_size:     a.batch_size,
            num_workers:    a.num_workers,
            csv_dir:        a.csv_dir,
            backend:        a.backend,
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image to segment
    #[arg(long)]
    pub image: String,

    /// Colour PNG to write
    #[arg(long, default_value = "prediction.png")]
    pub output: String,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

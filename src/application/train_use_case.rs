// ============================================================
// Layer 2: TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the config
//   Step 2: Find train / val sample pairs   (Layer 4 - data)
//   Step 3: Build transforms and datasets   (Layer 4 - data)
//   Step 4: Save config, open metric logs   (Layer 6 - infra)
//   Step 5: Run training loop               (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::data::{
    dataset::SegDataset,
    loader::CityscapesLoader,
    transforms::{RandomHorizontalFlip, RandomResizedCrop, Resize, SegTransform},
};
use crate::domain::{labels::IGNORE_INDEX, traits::SampleSource};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::{
    aspp::atrous_rates,
    backbone::BackboneKind,
    backend::BackendKind,
    model::ModelKind,
    trainer::{run_training, TrainSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every hyper-parameter of a run. Saved next to the checkpoints so
// `evaluate` and `predict` can rebuild the same architecture.
// Missing keys in a JSON config fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    // ── Model ──
    pub model:              ModelKind,
    pub backbone:           BackboneKind,
    pub output_stride:      usize,
    pub num_classes:        usize,
    pub ignore_index:       u8,
    pub width_divisor:      usize,
    pub decoder_channels:   usize,
    pub unet_base_channels: usize,
    pub pretrained_weights: Option<String>,

    // ── Paths ──
    pub data_root:      String,
    pub checkpoint_dir: String,

    // ── Optimisation ──
    pub batch_size:       usize,
    pub epochs:           usize,
    pub lr:               f64,
    pub min_lr:           f64,
    pub plateau_factor:   f64,
    pub plateau_patience: usize,
    pub eval_every:       usize,

    // ── Augmentation (sizes are [height, width]) ──
    pub crop_size:  [u32; 2],
    pub crop_scale: [f32; 2],
    pub crop_ratio: [f32; 2],
    pub flip_prob:  f32,
    pub eval_size:  Option<[u32; 2]>,

    // ── Runtime ──
    pub num_workers: usize,
    pub seed:        u64,
    pub backend:     BackendKind,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model:              ModelKind::UNet,
            backbone:           BackboneKind::ResNet101,
            output_stride:      16,
            num_classes:        19,
            ignore_index:       IGNORE_INDEX,
            width_divisor:      1,
            decoder_channels:   256,
            unet_base_channels: 64,
            pretrained_weights: None,

            data_root:      "data/cityscapes".to_string(),
            checkpoint_dir: "checkpoints".to_string(),

            batch_size:       8,
            epochs:           100,
            lr:               1e-3,
            min_lr:           1e-4,
            plateau_factor:   0.1,
            plateau_patience: 10,
            eval_every:       1,

            crop_size:  [512, 1024],
            crop_scale: [0.25, 1.0],
            crop_ratio: [0.75, 4.0 / 3.0],
            flip_prob:  0.5,
            eval_size:  None,

            num_workers: 4,
            seed:        42,
            backend:     BackendKind::Wgpu,
        }
    }
}

fn check_range(name: &str, [lo, hi]: [f32; 2]) -> Result<()> {
    ensure!(
        lo > 0.0 && lo <= hi,
        "{name} must satisfy 0 < min <= max, got [{lo}, {hi}]"
    );
    Ok(())
}

impl TrainConfig {
    /// Load a full config from JSON; absent keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if atrous_rates(self.output_stride).is_none() {
            bail!("output_stride must be 8 or 16, got {}", self.output_stride);
        }
        ensure!(self.num_classes > 0, "num_classes must be at least 1");
        ensure!(
            (self.ignore_index as usize) >= self.num_classes,
            "ignore_index {} collides with a class id (num_classes = {})",
            self.ignore_index,
            self.num_classes
        );
        ensure!(self.batch_size > 0, "batch_size must be at least 1");
        ensure!(self.epochs > 0, "epochs must be at least 1");
        ensure!(self.eval_every > 0, "eval_every must be at least 1");
        ensure!(self.width_divisor > 0, "width_divisor must be at least 1");
        ensure!(
            self.crop_size.iter().all(|&s| s > 0),
            "crop_size must be positive, got {:?}",
            self.crop_size
        );
        if let Some(size) = self.eval_size {
            ensure!(size.iter().all(|&s| s > 0), "eval_size must be positive, got {size:?}");
        }
        check_range("crop_scale", self.crop_scale)?;
        check_range("crop_ratio", self.crop_ratio)?;
        ensure!(
            (0.0..=1.0).contains(&self.flip_prob),
            "flip_prob must be within [0, 1], got {}",
            self.flip_prob
        );
        ensure!(
            self.lr > 0.0 && self.min_lr >= 0.0,
            "learning rates must be positive"
        );
        Ok(())
    }

    pub fn train_transform(&self) -> SegTransform {
        let [h, w] = self.crop_size;
        SegTransform::Train {
            flip: RandomHorizontalFlip::new(self.flip_prob),
            crop: RandomResizedCrop::new(
                (h, w),
                (self.crop_scale[0], self.crop_scale[1]),
                (self.crop_ratio[0], self.crop_ratio[1]),
            ),
        }
    }

    pub fn eval_transform(&self) -> SegTransform {
        SegTransform::Eval {
            resize: self.eval_size.map(|[h, w]| Resize { size: (h, w) }),
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainSummary> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;
        tracing::info!(
            "Training {} (backbone {:?}, output stride {}) on {:?}",
            cfg.model,
            cfg.backbone,
            cfg.output_stride,
            cfg.backend
        );

        // ── Step 2: Find sample pairs ─────────────────────────────────────────
        tracing::info!("Loading Cityscapes splits from '{}'", cfg.data_root);
        let train_samples = CityscapesLoader::new(&cfg.data_root, "train").load_all()?;
        let val_samples   = CityscapesLoader::new(&cfg.data_root, "val").load_all()?;
        if train_samples.is_empty() {
            bail!("No training samples found under '{}'", cfg.data_root);
        }
        if val_samples.is_empty() {
            bail!("No validation samples found under '{}'", cfg.data_root);
        }
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );

        // ── Step 3: Build Burn datasets ───────────────────────────────────────
        let train_dataset = SegDataset::new(train_samples, cfg.train_transform(), cfg.num_classes, cfg.ignore_index)
            .with_seed(cfg.seed);
        let val_dataset   = SegDataset::new(val_samples, cfg.eval_transform(), cfg.num_classes, cfg.ignore_index);

        // ── Step 4: Save config for evaluation / prediction ───────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt_manager.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 5: Run training loop (Layer 5) ───────────────────────────────
        let summary = run_training(cfg, train_dataset, val_dataset, &ckpt_manager, &metrics)?;
        match summary.best {
            Some(best) => tracing::info!(
                "Best mIoU {:.4} at epoch {} → '{}'",
                best.miou,
                best.epoch,
                ckpt_manager.best_path(cfg.model).display()
            ),
            None => tracing::warn!("No checkpoint was written"),
        }
        Ok(summary)
    }
}

// ============================================================
// Layer 5: Training Loop
// ============================================================
// Adam + reduce-on-plateau over Burn's DataLoader.
//
//   for each epoch:
//     for each batch:  forward → masked CE → backward → Adam step
//     every `eval_every` epochs (and on the last one):
//       model.valid() → evaluate → scheduler.step(val_loss)
//       mIoU beats the best so far → overwrite <model>_best
//
// The model and backend are picked at runtime; everything below
// `run_training` is generic over both.
//
//   - Training runs on Autodiff<Inner> for gradients
//   - model.valid() returns the model on the inner backend
//   - The validation batcher therefore uses the inner backend too
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::path::Path;

use anyhow::{bail, Result};
use burn::{
    backend::Autodiff,
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::SegBatcher, dataset::SegDataset};
use crate::infra::{
    checkpoint::{load_weights, BestRecord, CheckpointManager},
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    backend::{BackendKind, CpuBackend, GpuBackend},
    evaluator::evaluate,
    loss::segmentation_loss,
    model::{deeplab_config, unet_config, ModelKind, SegmentationModel},
    scheduler::PlateauScheduler,
};

/// What a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub epochs: usize,
    pub steps:  usize,
    pub best:   Option<BestRecord>,
}

/// Validation runs every `eval_every` epochs and always on the last.
fn is_eval_epoch(epoch: usize, eval_every: usize, epochs: usize) -> bool {
    epoch % eval_every == 0 || epoch == epochs
}

/// Best score so far; a new record needs a strictly higher mIoU.
#[derive(Debug, Default)]
struct BestTracker {
    best: Option<BestRecord>,
}

impl BestTracker {
    /// The record to checkpoint, if `row` beats the current best.
    fn offer(&mut self, row: &EpochMetrics) -> Option<BestRecord> {
        let best_miou = self.best.map_or(f64::NEG_INFINITY, |b| b.miou);
        if !row.is_improvement(best_miou) {
            return None;
        }
        let record = BestRecord { epoch: row.epoch, miou: row.miou? };
        self.best = Some(record);
        Some(record)
    }
}

pub fn run_training(
    cfg:           &TrainConfig,
    train_dataset: SegDataset,
    val_dataset:   SegDataset,
    ckpt_manager:  &CheckpointManager,
    metrics:       &MetricsLogger,
) -> Result<TrainSummary> {
    match cfg.backend {
        BackendKind::Wgpu => {
            run_on::<Autodiff<GpuBackend>>(cfg, train_dataset, val_dataset, ckpt_manager, metrics)
        }
        BackendKind::NdArray => {
            run_on::<Autodiff<CpuBackend>>(cfg, train_dataset, val_dataset, ckpt_manager, metrics)
        }
    }
}

fn run_on<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    train_dataset: SegDataset,
    val_dataset:   SegDataset,
    ckpt_manager:  &CheckpointManager,
    metrics:       &MetricsLogger,
) -> Result<TrainSummary> {
    let device = B::Device::default();
    tracing::info!("Using {:?} device: {:?}", cfg.backend, device);
    B::seed(cfg.seed);

    let run = TrainRun { cfg, ckpt_manager, metrics, device: device.clone() };
    match cfg.model {
        ModelKind::UNet => {
            run.train_loop(unet_config(cfg).init::<B>(&device), train_dataset, val_dataset)
        }
        ModelKind::Proposed => {
            run.train_loop(deeplab_config(cfg).init_proposed::<B>(&device), train_dataset, val_dataset)
        }
        ModelKind::AttentionDeepLabV3Plus => {
            run.train_loop(deeplab_config(cfg).init_attention::<B>(&device), train_dataset, val_dataset)
        }
    }
}

struct TrainRun<'a, B: AutodiffBackend> {
    cfg:          &'a TrainConfig,
    ckpt_manager: &'a CheckpointManager,
    metrics:      &'a MetricsLogger,
    device:       B::Device,
}

impl<B: AutodiffBackend> TrainRun<'_, B> {
    fn train_loop<M>(
        &self,
        mut model:     M,
        train_dataset: SegDataset,
        val_dataset:   SegDataset,
    ) -> Result<TrainSummary>
    where
        M: SegmentationModel<B> + AutodiffModule<B>,
        M::InnerModule: SegmentationModel<B::InnerBackend>,
    {
        let cfg = self.cfg;
        tracing::info!(
            "Model ready: {} ({} parameters)",
            cfg.model,
            model.num_params()
        );

        // ── Optional warm start ───────────────────────────────────────────────
        if let Some(path) = cfg.pretrained_weights.as_deref() {
            let path = Path::new(path);
            if path.exists() {
                model = load_weights::<B, _>(model, path, &self.device)?;
                tracing::info!("Loaded pretrained weights from '{}'", path.display());
            } else {
                tracing::warn!("Pretrained weights '{}' not found; starting from scratch", path.display());
            }
        }

        // m = β1*m + (1-β1)*g,  v = β2*v + (1-β2)*g²,  θ -= lr * m / (√v + ε)
        let mut optim     = AdamConfig::new().with_epsilon(1e-8).init();
        let mut scheduler = PlateauScheduler::new(
            cfg.lr,
            cfg.plateau_factor,
            cfg.plateau_patience,
            cfg.min_lr,
        );

        // ── Data loaders ──────────────────────────────────────────────────────
        let train_loader = DataLoaderBuilder::new(SegBatcher::<B>::new(self.device.clone()))
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed)
            .num_workers(cfg.num_workers)
            .build(train_dataset);

        let val_loader = DataLoaderBuilder::new(SegBatcher::<B::InnerBackend>::new(self.device.clone()))
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .build(val_dataset);

        // ── Epoch loop ────────────────────────────────────────────────────────
        let mut best = BestTracker::default();
        let mut step = 0usize;
        let expected = train_loader.num_items();

        for epoch in 1..=cfg.epochs {
            let lr = scheduler.lr();
            let mut loss_sum = 0.0f64;
            let mut batches  = 0usize;
            let mut images   = 0usize;

            for batch in train_loader.iter() {
                images += batch.images.dims()[0];
                let logits = model.forward(batch.images);
                let loss   = segmentation_loss(logits, batch.masks, cfg.ignore_index);

                let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
                loss_sum += loss_val;
                batches  += 1;
                step     += 1;
                self.metrics.log_step(step, loss_val)?;
                tracing::debug!("step {step}: loss={loss_val:.4}");

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(lr, model, grads);
            }

            if batches == 0 {
                bail!("Training loader produced no batches; is the train split empty?");
            }
            // Burn's iterators stop at the first sample that fails to load.
            if images < expected {
                bail!("Epoch {epoch} stopped after {images} of {expected} images; a sample failed to load");
            }
            let train_loss = loss_sum / batches as f64;

            // ── Validation ────────────────────────────────────────────────────
            let mut row = EpochMetrics { epoch, train_loss, val_loss: None, miou: None, lr };

            if is_eval_epoch(epoch, cfg.eval_every, cfg.epochs) {
                let model_valid = model.valid();
                let report = evaluate(&model_valid, val_loader.as_ref(), cfg.num_classes, cfg.ignore_index)?;

                row.val_loss = Some(report.val_loss);
                row.miou     = Some(report.miou);
                row.lr       = scheduler.step(report.val_loss);

                if let Some(record) = best.offer(&row) {
                    self.ckpt_manager
                        .save_best::<B::InnerBackend, _>(&model_valid, cfg.model, record)?;
                    tracing::info!("New best mIoU {:.4} at epoch {}", record.miou, epoch);
                }
            }

            println!(
                "Epoch {:>3}/{} | train_loss={:.4} | val_loss={} | mIoU={} | lr={:.2e}",
                epoch,
                cfg.epochs,
                train_loss,
                row.val_loss.map_or("-".into(), |v| format!("{v:.4}")),
                row.miou.map_or("-".into(), |v| format!("{:.2}%", v * 100.0)),
                row.lr,
            );
            self.metrics.log(&row)?;
        }

        tracing::info!("Training complete!");
        Ok(TrainSummary { epochs: cfg.epochs, steps: step, best: best.best })
    }
}

// ============================================================
// Layer 5: Evaluation Loop
// ============================================================
// Inference-only pass over a loader:
//
//   logits = model(images)               timed, incl. argmax readback
//   loss  += masked cross-entropy        averaged over batches
//   confusion.update(targets, argmax)    → per-class IoU, mIoU
//
// Called on the inner (non-autodiff) backend, both by the
// trainer after `model.valid()` and by the `evaluate` command.

use std::{sync::Arc, time::Instant};

use anyhow::{bail, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{SegBatch, SegBatcher},
    dataset::SegDataset,
};
use crate::domain::{confusion::ConfusionMatrix, report::EvalReport};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    backend::{BackendKind, CpuBackend, GpuBackend},
    loss::segmentation_loss,
    model::{with_model, ModelTask, SegmentationModel},
};

/// Evaluate the best checkpoint of the run described by `cfg`.
pub fn run_evaluation(
    cfg:          &TrainConfig,
    ckpt_manager: &CheckpointManager,
    dataset:      SegDataset,
    backend:      BackendKind,
) -> Result<EvalReport> {
    match backend {
        BackendKind::Wgpu    => eval_on::<GpuBackend>(cfg, ckpt_manager, dataset),
        BackendKind::NdArray => eval_on::<CpuBackend>(cfg, ckpt_manager, dataset),
    }
}

fn eval_on<B: Backend>(
    cfg:          &TrainConfig,
    ckpt_manager: &CheckpointManager,
    dataset:      SegDataset,
) -> Result<EvalReport> {
    let device = B::Device::default();
    tracing::info!("Evaluating on device: {:?}", device);

    let loader = DataLoaderBuilder::new(SegBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(dataset);

    let task = EvalTask { cfg, ckpt_manager, loader, device: device.clone() };
    with_model::<B, _>(cfg, &device, task)
}

struct EvalTask<'a, B: Backend> {
    cfg:          &'a TrainConfig,
    ckpt_manager: &'a CheckpointManager,
    loader:       Arc<dyn DataLoader<SegBatch<B>>>,
    device:       B::Device,
}

impl<B: Backend> ModelTask<B> for EvalTask<'_, B> {
    type Output = Result<EvalReport>;

    fn run<M: SegmentationModel<B>>(self, model: M) -> Result<EvalReport> {
        let model = self.ckpt_manager.load_best::<B, _>(model, self.cfg.model, &self.device)?;
        evaluate(&model, self.loader.as_ref(), self.cfg.num_classes, self.cfg.ignore_index)
    }
}

pub fn evaluate<B, M>(
    model:       &M,
    loader:      &dyn DataLoader<SegBatch<B>>,
    num_classes: usize,
    ignore:      u8,
) -> Result<EvalReport>
where
    B: Backend,
    M: SegmentationModel<B>,
{
    let mut confusion = ConfusionMatrix::new(num_classes, ignore as usize);
    let mut loss_sum  = 0.0f64;
    let mut batches   = 0usize;
    let mut images    = 0usize;
    let mut seconds   = 0.0f64;

    for batch in loader.iter() {
        images += batch.images.dims()[0];

        let start  = Instant::now();
        let logits = model.forward(batch.images);
        // Reading the predictions back forces the device to finish.
        let preds: Vec<i64> = logits
            .clone()
            .argmax(1)
            .into_data()
            .iter::<i64>()
            .collect();
        seconds += start.elapsed().as_secs_f64();

        let loss: f64 = segmentation_loss(logits, batch.masks.clone(), ignore)
            .into_scalar()
            .elem::<f64>();
        loss_sum += loss;
        batches  += 1;

        let targets: Vec<i64> = batch.masks.into_data().iter::<i64>().collect();
        confusion.update(&targets, &preds);
    }

    if batches == 0 {
        bail!("Evaluation loader produced no batches");
    }
    // Burn's iterators stop at the first sample that fails to load.
    let expected = loader.num_items();
    if images < expected {
        bail!("Evaluation stopped after {images} of {expected} images; a sample failed to load");
    }

    let (inference_ms, fps) = EvalReport::timing(seconds, images);
    Ok(EvalReport {
        val_loss:       loss_sum / batches as f64,
        miou:           confusion.mean_iou(),
        pixel_accuracy: confusion.pixel_accuracy(),
        class_iou:      confusion.class_iou(),
        inference_ms,
        fps,
        images,
    })
}

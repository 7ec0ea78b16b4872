// ============================================================
// Layer 2: EvaluateUseCase
// ============================================================
// Rebuilds the trained architecture from train_config.json,
// loads the best checkpoint, runs one inference-only pass over
// a split and writes the timestamped CSV report.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::data::{dataset::SegDataset, loader::CityscapesLoader};
use crate::domain::{report::EvalReport, traits::SampleSource};
use crate::infra::{checkpoint::CheckpointManager, metrics::write_eval_csv};
use crate::ml::{backend::BackendKind, evaluator::run_evaluation};

/// Anything left as `None` falls back to the training config.
#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub checkpoint_dir: String,
    pub data_root:      Option<String>,
    pub split:          String,
    pub batch_size:     Option<usize>,
    pub num_workers:    Option<usize>,
    pub csv_dir:        String,
    pub backend:        Option<BackendKind>,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    /// Returns the report and the CSV file it was written to.
    pub fn execute(&self) -> Result<(EvalReport, PathBuf)> {
        let ev   = &self.config;
        let ckpt = CheckpointManager::new(&ev.checkpoint_dir);

        let mut cfg = ckpt.load_config()?;
        if let Some(root) = &ev.data_root {
            cfg.data_root = root.clone();
        }
        if let Some(batch_size) = ev.batch_size {
            cfg.batch_size = batch_size;
        }
        if let Some(workers) = ev.num_workers {
            cfg.num_workers = workers;
        }
        cfg.validate()?;

        let samples = CityscapesLoader::new(&cfg.data_root, ev.split.as_str()).load_all()?;
        if samples.is_empty() {
            bail!("No '{}' samples found under '{}'", ev.split, cfg.data_root);
        }
        tracing::info!("Evaluating {} on {} '{}' images", cfg.model, samples.len(), ev.split);
        if let Some(best) = ckpt.load_best_record()? {
            tracing::info!("Checkpoint from epoch {} (val mIoU {:.4})", best.epoch, best.miou);
        }

        let dataset = SegDataset::new(samples, cfg.eval_transform(), cfg.num_classes, cfg.ignore_index);
        let report  = run_evaluation(&cfg, &ckpt, dataset, ev.backend.unwrap_or(cfg.backend))?;

        let csv = write_eval_csv(&ev.csv_dir, &report)?;
        tracing::info!("Saved evaluation report to '{}'", csv.display());
        Ok((report, csv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{tests::tiny_run, TrainUseCase};

    #[test]
    fn test_evaluates_trained_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = tiny_run(tmp.path());
        TrainUseCase::new(cfg.clone()).execute().unwrap();

        let csv_dir = tmp.path().join("csv");
        let (report, csv) = EvaluateUseCase::new(EvaluateConfig {
            checkpoint_dir: cfg.checkpoint_dir.clone(),
            data_root:      None,
            split:          "val".to_string(),
            batch_size:     Some(1),
            num_workers:    Some(1),
            csv_dir:        csv_dir.to_string_lossy().into_owned(),
            backend:        None,
        })
        .execute()
        .unwrap();

        assert_eq!(report.images, 1);
        assert_eq!(report.class_iou.len(), cfg.num_classes);
        assert!((0.0..=1.0).contains(&report.miou));
        assert!(csv.starts_with(&csv_dir));
        assert!(csv.exists());
    }

    #[test]
    fn test_missing_checkpoint_dir_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = EvaluateUseCase::new(EvaluateConfig {
            checkpoint_dir: tmp.path().join("nothing").to_string_lossy().into_owned(),
            data_root:      None,
            split:          "val".to_string(),
            batch_size:     None,
            num_workers:    None,
            csv_dir:        tmp.path().join("csv").to_string_lossy().into_owned(),
            backend:        Some(BackendKind::NdArray),
        })
        .execute();
        assert!(result.is_err());
    }
}

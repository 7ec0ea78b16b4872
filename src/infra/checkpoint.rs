// ============================================================
// Layer 6: Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder
// (named MessagePack, half precision).
//
// Files in the checkpoint directory:
//
//   checkpoints/
//     train_config.json      ← architecture + hyper-parameters
//     <model>_best.mpk       ← weights with the highest mIoU so far
//     best.json              ← { "epoch": .., "miou": .. } of that save
//
// The config is written before training starts; `evaluate` and
// `predict` rebuild the architecture from it before loading the
// weights, since a record only loads into a matching module.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::ModelKind;

const CONFIG_FILE: &str = "train_config.json";
const BEST_FILE:   &str = "best.json";

/// Epoch and score of the checkpoint currently stored as best.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestRecord {
    pub epoch: usize,
    pub miou:  f64,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// The directory is only created by the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", self.dir.display()))
    }

    /// Weights path without extension; the recorder appends its own.
    pub fn best_path(&self, kind: ModelKind) -> PathBuf {
        self.dir.join(kind.checkpoint_name())
    }

    // ─── Weights ──────────────────────────────────────────────────────────────

    /// Overwrite `<model>_best` with `model` and record why.
    pub fn save_best<B: Backend, M: Module<B>>(
        &self,
        model: &M,
        kind:  ModelKind,
        best:  BestRecord,
    ) -> Result<()> {
        self.ensure_dir()?;
        let path = self.best_path(kind);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let best_path = self.dir.join(BEST_FILE);
        fs::write(&best_path, serde_json::to_string_pretty(&best)?)
            .with_context(|| format!("Cannot write '{}'", best_path.display()))?;

        tracing::debug!("Saved best checkpoint: epoch {} mIoU {:.4}", best.epoch, best.miou);
        Ok(())
    }

    /// Load `<model>_best` into a freshly built model of the same architecture.
    pub fn load_best<B: Backend, M: Module<B>>(
        &self,
        model:  M,
        kind:   ModelKind,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.best_path(kind);
        tracing::info!("Loading checkpoint '{}'", path.display());
        load_weights(model, &path, device).with_context(|| {
            format!("No usable '{}' checkpoint. Have you trained the model first?", kind)
        })
    }

    /// `None` before the first best checkpoint is written.
    pub fn load_best_record(&self) -> Result<Option<BestRecord>> {
        let path = self.dir.join(BEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    // ─── Config ───────────────────────────────────────────────────────────────

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' with this checkpoint directory.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }
}

/// Load a CompactRecorder file (e.g. pretrained weights) into `model`.
pub fn load_weights<B: Backend, M: Module<B>>(
    model:  M,
    path:   &Path,
    device: &B::Device,
) -> Result<M> {
    let record = CompactRecorder::new()
        .load(path.to_path_buf(), device)
        .with_context(|| format!("Cannot load weights from '{}'", path.display()))?;
    Ok(model.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};

    type B = NdArray;

    #[test]
    fn test_config_round_trip() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path().join("run"));

        let cfg = TrainConfig { epochs: 3, ..TrainConfig::default() };
        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config().unwrap().epochs, 3);
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(CheckpointManager::new(tmp.path()).load_config().is_err());
    }

    #[test]
    fn test_reading_a_mistyped_dir_leaves_no_trace() {
        let tmp    = tempfile::tempdir().unwrap();
        let typo   = tmp.path().join("chekpoints");
        let ckpt   = CheckpointManager::new(&typo);
        let device = Default::default();
        let model: Linear<B> = LinearConfig::new(2, 2).init(&device);

        assert!(ckpt.load_config().is_err());
        assert!(ckpt.load_best(model, ModelKind::UNet, &device).is_err());
        assert_eq!(ckpt.load_best_record().unwrap(), None);
        assert!(!typo.exists());
    }

    #[test]
    fn test_best_checkpoint_restores_weights() {
        let tmp    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path());
        let device = Default::default();

        assert_eq!(ckpt.load_best_record().unwrap(), None);

        let saved: Linear<B> = LinearConfig::new(4, 2).init(&device);
        let best = BestRecord { epoch: 7, miou: 0.42 };
        ckpt.save_best(&saved, ModelKind::UNet, best).unwrap();
        assert_eq!(ckpt.load_best_record().unwrap(), Some(best));

        let fresh: Linear<B> = LinearConfig::new(4, 2).init(&device);
        let loaded = ckpt.load_best(fresh, ModelKind::UNet, &device).unwrap();

        let a: Vec<f32> = saved.weight.val().into_data().iter::<f32>().collect();
        let b: Vec<f32> = loaded.weight.val().into_data().iter::<f32>().collect();
        // half-precision storage
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2);
        }
    }

    #[test]
    fn test_load_best_without_checkpoint_fails() {
        let tmp    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path());
        let device = Default::default();
        let model: Linear<B> = LinearConfig::new(2, 2).init(&device);
        assert!(ckpt.load_best(model, ModelKind::Proposed, &device).is_err());
    }
}

// ============================================================
// Layer 6: Metrics Logger
// ============================================================
// Scalar logs as CSV, in the checkpoint directory:
//
//   metrics.csv     one row per epoch
//     epoch,train_loss,val_loss,miou,lr
//     1,1.934211,1.702345,0.212345,0.000100
//     2,1.512008,,,0.000100          ← no evaluation this epoch
//
//   train_loss.csv  one row per optimiser step
//     step,loss
//
// Headers are only written when a file is new, so resumed runs
// append to the same log.
//
// Evaluation reports go to `<csv_dir>/test<YYMMDD_HHMMSS>.csv`.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::domain::report::EvalReport;

/// One row of metrics.csv
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:      usize,
    /// Mean loss over the epoch's training batches
    pub train_loss: f64,
    /// Present only on epochs that ran validation
    pub val_loss:   Option<f64>,
    pub miou:       Option<f64>,
    /// Learning rate in effect at the end of the epoch
    pub lr:         f64,
}

impl EpochMetrics {
    /// True if this epoch was evaluated and beat the best mIoU so far
    pub fn is_improvement(&self, best_miou: f64) -> bool {
        self.miou.is_some_and(|miou| miou > best_miou)
    }
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

fn create_with_header(path: &Path, header: &str) -> Result<()> {
    if !path.exists() {
        let mut f = fs::File::create(path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        writeln!(f, "{header}")?;
        tracing::debug!("Created metrics CSV: '{}'", path.display());
    }
    Ok(())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Cannot append to '{}'", path.display()))?;
    writeln!(f, "{line}")?;
    Ok(())
}

pub struct MetricsLogger {
    epoch_csv: PathBuf,
    step_csv:  PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let epoch_csv = dir.join("metrics.csv");
        let step_csv  = dir.join("train_loss.csv");
        create_with_header(&epoch_csv, "epoch,train_loss,val_loss,miou,lr")?;
        create_with_header(&step_csv,  "step,loss")?;

        Ok(Self { epoch_csv, step_csv })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        append_line(
            &self.epoch_csv,
            &format!(
                "{},{:.6},{},{},{:.6}",
                m.epoch,
                m.train_loss,
                opt(m.val_loss),
                opt(m.miou),
                m.lr,
            ),
        )
    }

    /// `step` counts optimiser steps from the start of training.
    pub fn log_step(&self, step: usize, loss: f64) -> Result<()> {
        append_line(&self.step_csv, &format!("{step},{loss:.6}"))
    }
}

/// Write an evaluation report as two-column CSV, named after the
/// current local time. Returns the file written.
pub fn write_eval_csv(csv_dir: impl AsRef<Path>, report: &EvalReport) -> Result<PathBuf> {
    let csv_dir = csv_dir.as_ref();
    fs::create_dir_all(csv_dir)
        .with_context(|| format!("Cannot create '{}'", csv_dir.display()))?;

    let stamp = chrono::Local::now().format("%y%m%d_%H%M%S");
    let path  = csv_dir.join(format!("test{stamp}.csv"));

    let mut rows = vec![
        format!("Validation loss,{}", report.val_loss),
        format!("mIoU,{}", report.miou),
        format!("Inference time (ms),{}", report.inference_ms),
        format!("FPS,{}", report.fps),
    ];
    for (name, iou) in report.named_iou() {
        rows.push(format!("IoU {name},{}", iou.map(|v| v.to_string()).unwrap_or_default()));
    }

    fs::write(&path, rows.join("\n") + "\n")
        .with_context(|| format!("Cannot write '{}'", path.display()))?;
    Ok(path)
}

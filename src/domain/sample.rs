// ============================================================
// Layer 3: Sample Domain Type
// ============================================================
// A single training or evaluation example, as it exists on disk:
// one RGB street-scene image and its per-pixel label image.
//
// The loader only deals in paths. Decoding happens lazily inside
// the dataset so the whole split never has to sit in memory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One (image, label) pair from a dataset split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePaths {
    /// RGB image, e.g. `leftImg8bit/train/aachen/aachen_000000_000019_leftImg8bit.png`
    pub image: PathBuf,

    /// Label image holding one labelId per pixel,
    /// e.g. `gtFine/train/aachen/aachen_000000_000019_gtFine_labelIds.png`
    pub mask: PathBuf,
}

impl SamplePaths {
    pub fn new(image: impl Into<PathBuf>, mask: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            mask:  mask.into(),
        }
    }

    /// Short human-readable identifier (the image file name)
    pub fn name(&self) -> String {
        self.image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

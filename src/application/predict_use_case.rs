// ============================================================
// Layer 2: PredictUseCase
// ============================================================
// Segments one image with the best checkpoint and writes the
// prediction as a Cityscapes-coloured PNG.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    backend::BackendKind,
    inferencer::{colourize, run_prediction},
};

pub struct PredictUseCase {
    checkpoint_dir: String,
    backend:        Option<BackendKind>,
}

impl PredictUseCase {
    pub fn new(checkpoint_dir: String, backend: Option<BackendKind>) -> Self {
        Self { checkpoint_dir, backend }
    }

    /// Segment `image` and save the colour mask to `output`.
    pub fn predict(&self, image: &str, output: &str) -> Result<PathBuf> {
        let ckpt = CheckpointManager::new(&self.checkpoint_dir);
        let cfg  = ckpt.load_config()?;

        let rgb = image::open(image)
            .with_context(|| format!("Cannot open image '{image}'"))?
            .to_rgb8();
        tracing::info!("Segmenting '{}' ({}x{}) with {}", image, rgb.width(), rgb.height(), cfg.model);

        let mask = run_prediction(&cfg, &ckpt, &rgb, self.backend.unwrap_or(cfg.backend))?;

        let output = PathBuf::from(output);
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        colourize(&mask)
            .save(&output)
            .with_context(|| format!("Cannot write '{}'", output.display()))?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{tests::tiny_run, TrainUseCase};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_writes_colour_mask_of_input_size() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = tiny_run(tmp.path());
        TrainUseCase::new(cfg.clone()).execute().unwrap();

        let input = tmp.path().join("street.png");
        RgbImage::from_pixel(24, 18, Rgb([90, 90, 90])).save(&input).unwrap();
        let output = tmp.path().join("out").join("street_mask.png");

        let written = PredictUseCase::new(cfg.checkpoint_dir.clone(), None)
            .predict(&input.to_string_lossy(), &output.to_string_lossy())
            .unwrap();

        assert_eq!(written, output);
        assert_eq!(image::image_dimensions(&output).unwrap(), (24, 18));
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = tiny_run(tmp.path());
        TrainUseCase::new(cfg.clone()).execute().unwrap();

        let result = PredictUseCase::new(cfg.checkpoint_dir, Some(BackendKind::NdArray))
            .predict("/definitely/not/here.png", &tmp.path().join("x.png").to_string_lossy());
        assert!(result.is_err());
    }
}

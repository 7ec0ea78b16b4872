// ============================================================
// Layer 5: Inferencer
// ============================================================
// Segments a single image with the best checkpoint:
//
//   RGB image ─► (optional resize) ─► normalise ─► model
//             ─► argmax over classes ─► trainId mask
//             ─► nearest resize back to the original size
//
// `colourize` turns the trainId mask into a palette image.

use anyhow::{ensure, Result};
use burn::prelude::*;
use image::{imageops::FilterType, GrayImage, Luma, Rgb, RgbImage};

use crate::application::train_use_case::TrainConfig;
use crate::data::transforms::Normalize;
use crate::domain::labels::colour_of;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    backend::{BackendKind, CpuBackend, GpuBackend},
    model::{with_model, ModelTask, SegmentationModel},
};

/// Run `model` on one image and return its trainId mask at the
/// image's own resolution. `size` is the (height, width) the model
/// sees; `None` feeds the image as is.
pub fn predict_mask<B, M>(
    model:  &M,
    image:  &RgbImage,
    size:   Option<(u32, u32)>,
    device: &B::Device,
) -> Result<GrayImage>
where
    B: Backend,
    M: SegmentationModel<B>,
{
    let (orig_w, orig_h) = image.dimensions();
    ensure!(orig_w > 0 && orig_h > 0, "Cannot segment an empty image");

    let input = match size {
        Some((h, w)) if (w, h) != (orig_w, orig_h) => {
            image::imageops::resize(image, w, h, FilterType::Triangle)
        }
        _ => image.clone(),
    };
    let (w, h) = input.dimensions();

    let pixels = Normalize::imagenet().to_chw(&input);
    let tensor = Tensor::<B, 4>::from_data(
        TensorData::new(pixels, [1, 3, h as usize, w as usize]),
        device,
    );

    let classes: Vec<u8> = model
        .forward(tensor)
        .argmax(1)
        .into_data()
        .iter::<i64>()
        .map(|c| c.clamp(0, u8::MAX as i64) as u8)
        .collect();

    let mask = GrayImage::from_raw(w, h, classes)
        .ok_or_else(|| anyhow::anyhow!("Prediction size does not match {w}x{h}"))?;

    if (w, h) == (orig_w, orig_h) {
        Ok(mask)
    } else {
        Ok(image::imageops::resize(&mask, orig_w, orig_h, FilterType::Nearest))
    }
}

/// Paint a trainId mask with the Cityscapes palette.
pub fn colourize(mask: &GrayImage) -> RgbImage {
    RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let Luma([id]) = *mask.get_pixel(x, y);
        Rgb(colour_of(id as usize))
    })
}

/// Load the best checkpoint of `cfg` and segment `image`.
pub fn run_prediction(
    cfg:          &TrainConfig,
    ckpt_manager: &CheckpointManager,
    image:        &RgbImage,
    backend:      BackendKind,
) -> Result<GrayImage> {
    match backend {
        BackendKind::Wgpu    => predict_on::<GpuBackend>(cfg, ckpt_manager, image),
        BackendKind::NdArray => predict_on::<CpuBackend>(cfg, ckpt_manager, image),
    }
}

fn predict_on<B: Backend>(
    cfg:          &TrainConfig,
    ckpt_manager: &CheckpointManager,
    image:        &RgbImage,
) -> Result<GrayImage> {
    let device = B::Device::default();
    let task   = PredictTask { cfg, ckpt_manager, image, device: device.clone() };
    with_model::<B, _>(cfg, &device, task)
}

struct PredictTask<'a, B: Backend> {
    cfg:          &'a TrainConfig,
    ckpt_manager: &'a CheckpointManager,
    image:        &'a RgbImage,
    device:       B::Device,
}

impl<B: Backend> ModelTask<B> for PredictTask<'_, B> {
    type Output = Result<GrayImage>;

    fn run<M: SegmentationModel<B>>(self, model: M) -> Result<GrayImage> {
        let model = self.ckpt_manager.load_best::<B, _>(model, self.cfg.model, &self.device)?;
        let size  = self.cfg.eval_size.map(|[h, w]| (h, w));
        predict_mask::<B, _>(&model, self.image, size, &self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::ml::unet::UNetConfig;

    #[test]
    fn test_mask_has_original_size_and_valid_ids() {
        let device = Default::default();
        let model  = UNetConfig::new(4).with_base_channels(2).init::<NdArray>(&device);
        let image  = RgbImage::from_pixel(20, 12, Rgb([120, 60, 30]));

        let mask = predict_mask::<NdArray, _>(&model, &image, Some((16, 16)), &device).unwrap();
        assert_eq!(mask.dimensions(), (20, 12));
        assert!(mask.pixels().all(|p| p[0] < 4));
    }

    #[test]
    fn test_colourize_uses_palette() {
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(0, 0, Luma([0]));
        mask.put_pixel(1, 0, Luma([13]));

        let colour = colourize(&mask);
        assert_eq!(colour.get_pixel(0, 0).0, [128, 64, 128]);
        assert_eq!(colour.get_pixel(1, 0).0, [0, 0, 142]);
    }
}

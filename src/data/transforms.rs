// ============================================================
// Layer 4: Paired Image / Mask Transforms
// ============================================================
// Every geometric augmentation must move the image and its label
// mask identically, otherwise pixels stop lining up with their
// classes. The transforms here always take both at once.
//
//   RandomHorizontalFlip  flips both, or neither
//   RandomResizedCrop     one random window, resized to a fixed size
//   Resize                deterministic resize (evaluation)
//   Normalize             image only: /255, then ImageNet mean/std
//
// Interpolation: bilinear (Triangle) for the image, nearest for
// the mask, so resized masks only ever contain ids that were
// already present.

use image::{
    imageops::{self, FilterType},
    GrayImage, RgbImage,
};
use rand::Rng;

/// An image and its label mask, always the same size.
#[derive(Debug, Clone)]
pub struct SegPair {
    pub image: RgbImage,
    pub mask:  GrayImage,
}

impl SegPair {
    pub fn new(image: RgbImage, mask: GrayImage) -> Self {
        debug_assert_eq!(image.dimensions(), mask.dimensions());
        Self { image, mask }
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn resize(self, height: u32, width: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self;
        }
        Self {
            image: imageops::resize(&self.image, width, height, FilterType::Triangle),
            mask:  imageops::resize(&self.mask, width, height, FilterType::Nearest),
        }
    }
}

// ─── RandomHorizontalFlip ─────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy)]
pub struct RandomHorizontalFlip {
    pub prob: f32,
}

impl RandomHorizontalFlip {
    pub fn new(prob: f32) -> Self {
        Self { prob }
    }

    pub fn apply<R: Rng + ?Sized>(&self, pair: &mut SegPair, rng: &mut R) {
        if self.prob <= 0.0 {
            return;
        }
        if rng.gen::<f32>() < self.prob {
            imageops::flip_horizontal_in_place(&mut pair.image);
            imageops::flip_horizontal_in_place(&mut pair.mask);
        }
    }
}

// ─── RandomResizedCrop ────────────────────────────────────────────────────────
/// Crop window in source pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub top:    u32,
    pub left:   u32,
    pub height: u32,
    pub width:  u32,
}

/// Crops a random area fraction (`scale`) with a random aspect ratio
/// (`ratio`, width / height) and resizes it to `size` = (height, width).
#[derive(Debug, Clone, Copy)]
pub struct RandomResizedCrop {
    pub size:  (u32, u32),
    pub scale: (f32, f32),
    pub ratio: (f32, f32),
}

impl RandomResizedCrop {
    pub fn new(size: (u32, u32), scale: (f32, f32), ratio: (f32, f32)) -> Self {
        Self { size, scale, ratio }
    }

    /// Sample a crop window for a `width` x `height` source.
    ///
    /// Up to 10 attempts at a random (area, aspect) that fits; if none
    /// fit, fall back to the largest centred window whose aspect ratio
    /// lies inside `ratio`.
    pub fn params<R: Rng + ?Sized>(&self, width: u32, height: u32, rng: &mut R) -> CropWindow {
        let area = (width * height) as f32;
        let (log_lo, log_hi) = (self.ratio.0.ln(), self.ratio.1.ln());

        for _ in 0..10 {
            let target_area = area * rng.gen_range(self.scale.0..=self.scale.1);
            let aspect      = rng.gen_range(log_lo..=log_hi).exp();

            let w = (target_area * aspect).sqrt().round() as u32;
            let h = (target_area / aspect).sqrt().round() as u32;

            if w > 0 && h > 0 && w <= width && h <= height {
                let top  = rng.gen_range(0..=height - h);
                let left = rng.gen_range(0..=width - w);
                return CropWindow { top, left, height: h, width: w };
            }
        }

        // Fallback: centre crop
        let in_ratio = width as f32 / height as f32;
        let (w, h) = if in_ratio < self.ratio.0 {
            (width, ((width as f32 / self.ratio.0).round() as u32).clamp(1, height))
        } else if in_ratio > self.ratio.1 {
            (((height as f32 * self.ratio.1).round() as u32).clamp(1, width), height)
        } else {
            (width, height)
        };
        CropWindow {
            top:    (height - h) / 2,
            left:   (width - w) / 2,
            height: h,
            width:  w,
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, pair: SegPair, rng: &mut R) -> SegPair {
        let (width, height) = pair.dimensions();
        let win = self.params(width, height, rng);

        let image = imageops::crop_imm(&pair.image, win.left, win.top, win.width, win.height).to_image();
        let mask  = imageops::crop_imm(&pair.mask, win.left, win.top, win.width, win.height).to_image();

        SegPair { image, mask }.resize(self.size.0, self.size.1)
    }
}

// ─── Resize ───────────────────────────────────────────────────────────────────
/// Deterministic resize to (height, width)
#[derive(Debug, Clone, Copy)]
pub struct Resize {
    pub size: (u32, u32),
}

impl Resize {
    pub fn apply(&self, pair: SegPair) -> SegPair {
        pair.resize(self.size.0, self.size.1)
    }
}

// ─── Normalize ────────────────────────────────────────────────────────────────
/// Per-channel `(x / 255 - mean) / std`, emitted in CHW order.
#[derive(Debug, Clone, Copy)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std:  [f32; 3],
}

impl Normalize {
    /// ImageNet statistics the backbones were designed around
    pub fn imagenet() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std:  [0.229, 0.224, 0.225],
        }
    }

    pub fn to_chw(&self, image: &RgbImage) -> Vec<f32> {
        let (w, h) = image.dimensions();
        let plane  = (w * h) as usize;
        let mut out = vec![0.0f32; plane * 3];
        for (x, y, px) in image.enumerate_pixels() {
            let base = (y * w + x) as usize;
            for c in 0..3 {
                out[c * plane + base] = (px[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
            }
        }
        out
    }
}

impl Default for Normalize {
    fn default() -> Self {
        Self::imagenet()
    }
}

// ─── Pipelines ────────────────────────────────────────────────────────────────
/// The geometric part of the pipeline for one split.
#[derive(Debug, Clone, Copy)]
pub enum SegTransform {
    /// Flip, then random resized crop
    Train {
        flip: RandomHorizontalFlip,
        crop: RandomResizedCrop,
    },
    /// Optional fixed resize, no randomness
    Eval { resize: Option<Resize> },
}

impl SegTransform {
    pub fn apply<R: Rng + ?Sized>(&self, mut pair: SegPair, rng: &mut R) -> SegPair {
        match self {
            SegTransform::Train { flip, crop } => {
                flip.apply(&mut pair, rng);
                crop.apply(pair, rng)
            }
            SegTransform::Eval { resize: Some(r) } => r.apply(pair),
            SegTransform::Eval { resize: None }    => pair,
        }
    }
}

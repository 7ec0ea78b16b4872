// ============================================================
// Layer 4: Cityscapes Sample Loader
// ============================================================
// Finds (image, label) pairs in a Cityscapes-style directory tree:
//
//   <root>/
//     leftImg8bit/<split>/<city>/<stem>_leftImg8bit.png
//     gtFine/<split>/<city>/<stem>_gtFine_labelIds.png
//
// Both files of every pair are decoded once here, so a truncated
// PNG is caught before it reaches a data loader (Burn's iterators
// end at the first item that fails). The decoded pixels are dropped;
// SegDataset loads them again lazily.
//
// Pairs that are missing a label file or fail to decode are logged
// and skipped instead of failing the whole split.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::sample::SamplePaths;
use crate::domain::traits::SampleSource;

const IMAGE_SUFFIX: &str = "_leftImg8bit.png";
const MASK_SUFFIX:  &str = "_gtFine_labelIds.png";

/// Loads the sample pairs of one split (train / val / test).
pub struct CityscapesLoader {
    root:  PathBuf,
    split: String,
}

impl CityscapesLoader {
    pub fn new(root: impl Into<PathBuf>, split: impl Into<String>) -> Self {
        Self {
            root:  root.into(),
            split: split.into(),
        }
    }

    fn image_dir(&self) -> PathBuf {
        self.root.join("leftImg8bit").join(&self.split)
    }

    fn mask_dir(&self) -> PathBuf {
        self.root.join("gtFine").join(&self.split)
    }

    /// Label path belonging to an image found under `city`
    fn mask_for(&self, city: &str, image_file: &str) -> Option<PathBuf> {
        let stem = image_file.strip_suffix(IMAGE_SUFFIX)?;
        let mut dir = self.mask_dir();
        if !city.is_empty() {
            dir = dir.join(city);
        }
        Some(dir.join(format!("{stem}{MASK_SUFFIX}")))
    }

    /// Images directly under `dir` (sorted), paired with their labels.
    fn collect_dir(&self, dir: &Path, city: &str, out: &mut Vec<SamplePaths>) -> Result<()> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        for image in files {
            let Some(file_name) = image.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(mask) = self.mask_for(city, file_name) else {
                continue;
            };

            match check_pair(&image, &mask) {
                Ok(()) => out.push(SamplePaths::new(image, mask)),
                Err(e) => tracing::warn!("Skipping '{}': {:#}", image.display(), e),
            }
        }
        Ok(())
    }
}

impl SampleSource for CityscapesLoader {
    fn load_all(&self) -> Result<Vec<SamplePaths>> {
        let image_dir = self.image_dir();
        if !image_dir.exists() {
            tracing::warn!(
                "Image directory '{}' does not exist, returning empty split",
                image_dir.display()
            );
            return Ok(Vec::new());
        }

        let mut samples = Vec::new();

        // Files placed directly in the split directory (no city level)
        self.collect_dir(&image_dir, "", &mut samples)?;

        let mut cities: Vec<PathBuf> = fs::read_dir(&image_dir)
            .with_context(|| format!("Cannot read directory '{}'", image_dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        cities.sort();

        for city_dir in cities {
            let city = city_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            self.collect_dir(&city_dir, &city, &mut samples)?;
        }

        tracing::info!(
            "Found {} '{}' samples under '{}'",
            samples.len(),
            self.split,
            self.root.display()
        );
        Ok(samples)
    }
}

fn decoded_size(path: &Path, what: &str) -> Result<(u32, u32)> {
    let img = image::open(path)
        .with_context(|| format!("cannot decode {what} '{}'", path.display()))?;
    Ok((img.width(), img.height()))
}

/// Both files must exist, decode fully and share a size.
fn check_pair(image: &Path, mask: &Path) -> Result<()> {
    if !mask.exists() {
        anyhow::bail!("missing label file '{}'", mask.display());
    }
    let image_dims = decoded_size(image, "image")?;
    let mask_dims  = decoded_size(mask, "label")?;
    if image_dims != mask_dims {
        anyhow::bail!(
            "image is {}x{} but label is {}x{}",
            image_dims.0, image_dims.1, mask_dims.0, mask_dims.1
        );
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    /// Write a synthetic Cityscapes tree: `n` image/label pairs per
    /// listed city, each `w`x`h`. Left half road (labelId 7), right
    /// half car (labelId 26), top row unlabeled (labelId 0).
    pub(crate) fn write_fake_split(root: &Path, split: &str, cities: &[&str], n: usize, w: u32, h: u32) {
        for city in cities {
            let img_dir  = root.join("leftImg8bit").join(split).join(city);
            let mask_dir = root.join("gtFine").join(split).join(city);
            fs::create_dir_all(&img_dir).unwrap();
            fs::create_dir_all(&mask_dir).unwrap();
            for i in 0..n {
                let stem  = format!("{city}_{i:06}_000019");
                let img   = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 90]));
                let mask  = GrayImage::from_fn(w, h, |x, y| {
                    if y == 0 { Luma([0]) } else if x < w / 2 { Luma([7]) } else { Luma([26]) }
                });
                img.save(img_dir.join(format!("{stem}{IMAGE_SUFFIX}"))).unwrap();
                mask.save(mask_dir.join(format!("{stem}{MASK_SUFFIX}"))).unwrap();
            }
        }
    }

    #[test]
    fn test_pairs_are_found_across_cities() {
        let tmp = tempfile::tempdir().unwrap();
        write_fake_split(tmp.path(), "train", &["aachen", "bremen"], 2, 8, 4);

        let samples = CityscapesLoader::new(tmp.path(), "train").load_all().unwrap();
        assert_eq!(samples.len(), 4);
        // Sorted by city then file name
        assert!(samples[0].name().starts_with("aachen_000000"));
        assert!(samples[3].name().starts_with("bremen_000001"));
        for s in &samples {
            assert!(s.mask.to_string_lossy().ends_with(MASK_SUFFIX));
        }
    }

    #[test]
    fn test_image_without_label_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_fake_split(tmp.path(), "val", &["lindau"], 2, 8, 4);
        let orphan = tmp.path().join("gtFine/val/lindau/lindau_000001_000019_gtFine_labelIds.png");
        fs::remove_file(orphan).unwrap();

        let samples = CityscapesLoader::new(tmp.path(), "val").load_all().unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_size_mismatch_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_fake_split(tmp.path(), "val", &["lindau"], 1, 8, 4);
        let mask = tmp.path().join("gtFine/val/lindau/lindau_000000_000019_gtFine_labelIds.png");
        GrayImage::new(4, 4).save(mask).unwrap();

        let samples = CityscapesLoader::new(tmp.path(), "val").load_all().unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_truncated_image_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_fake_split(tmp.path(), "val", &["lindau"], 3, 16, 16);
        let middle = tmp.path().join("leftImg8bit/val/lindau/lindau_000001_000019_leftImg8bit.png");
        // Header intact, pixel data cut short
        let bytes = fs::read(&middle).unwrap();
        fs::write(&middle, &bytes[..bytes.len() / 2]).unwrap();

        let samples = CityscapesLoader::new(tmp.path(), "val").load_all().unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.image != middle));
    }

    #[test]
    fn test_missing_split_gives_empty_list() {
        let tmp = tempfile::tempdir().unwrap();
        let samples = CityscapesLoader::new(tmp.path(), "train").load_all().unwrap();
        assert!(samples.is_empty());
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use burn::data::dataset::Dataset;
use image::GrayImage;
use rand::{rngs::StdRng, SeedableRng};

use crate::data::transforms::{Normalize, SegPair, SegTransform};
use crate::domain::{labels::label_to_train_id, sample::SamplePaths};

/// One decoded, transformed and normalised sample.
/// `image` is CHW, `mask` holds trainIds (or the ignore value).
#[derive(Debug, Clone)]
pub struct SegItem {
    pub image:  Vec<f32>,
    pub mask:   Vec<i64>,
    pub height: usize,
    pub width:  usize,
}

/// Lazily-decoding segmentation dataset over a list of file pairs.
///
/// Random augmentation is reproducible: the n-th read of sample `i`
/// draws from an RNG seeded with `(seed, i, n)`, so the crops of an
/// epoch do not depend on worker scheduling.
pub struct SegDataset {
    samples:     Vec<SamplePaths>,
    transform:   SegTransform,
    normalize:   Normalize,
    num_classes: usize,
    ignore:      u8,
    seed:        u64,
    reads:       Vec<AtomicU64>,
}

impl SegDataset {
    pub fn new(samples: Vec<SamplePaths>, transform: SegTransform, num_classes: usize, ignore: u8) -> Self {
        let reads = samples.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            samples,
            transform,
            normalize: Normalize::imagenet(),
            num_classes,
            ignore,
            seed: 0,
            reads,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn rng_for(&self, index: usize) -> StdRng {
        let n = self.reads[index].fetch_add(1, Ordering::Relaxed);
        // splitmix-style mixing of (seed, index, read count)
        let mut z = self.seed
            ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ n.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 30)).wrapping_mul(0x94D0_49BB_1331_11EB);
        StdRng::seed_from_u64(z ^ (z >> 31))
    }

    fn load(&self, index: usize, paths: &SamplePaths) -> anyhow::Result<SegItem> {
        let image = image::open(&paths.image)?.to_rgb8();
        let mask  = image::open(&paths.mask)?.to_luma8();

        let pair = self.transform.apply(SegPair::new(image, mask), &mut self.rng_for(index));
        let (width, height) = pair.dimensions();

        Ok(SegItem {
            image:  self.normalize.to_chw(&pair.image),
            mask:   train_ids(&pair.mask, self.num_classes, self.ignore),
            height: height as usize,
            width:  width as usize,
        })
    }
}

/// labelIds -> trainIds, row-major. TrainIds the model has no output
/// channel for become `ignore`.
fn train_ids(mask: &GrayImage, num_classes: usize, ignore: u8) -> Vec<i64> {
    mask.pixels()
        .map(|p| match label_to_train_id(p[0], ignore) {
            id if id != ignore && id as usize >= num_classes => ignore as i64,
            id => id as i64,
        })
        .collect()
}

impl Dataset<SegItem> for SegDataset {
    fn get(&self, index: usize) -> Option<SegItem> {
        let paths = self.samples.get(index)?;
        match self.load(index, paths) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::error!("Failed to load sample '{}': {:#}", paths.name(), e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::{tests::write_fake_split, CityscapesLoader};
    use crate::data::transforms::{RandomHorizontalFlip, RandomResizedCrop, Resize};
    use crate::domain::{labels::IGNORE_INDEX, traits::SampleSource};

    #[test]
    fn test_eval_item_maps_label_ids_to_train_ids() {
        let tmp = tempfile::tempdir().unwrap();
        write_fake_split(tmp.path(), "val", &["lindau"], 1, 8, 4);
        let samples = CityscapesLoader::new(tmp.path(), "val").load_all().unwrap();

        let ds   = SegDataset::new(samples, SegTransform::Eval { resize: None }, 19, IGNORE_INDEX);
        let item = ds.get(0).unwrap();

        assert_eq!((item.height, item.width), (4, 8));
        assert_eq!(item.image.len(), 3 * 4 * 8);
        assert_eq!(item.mask.len(), 4 * 8);
        // Top row is unlabeled, then road (0) on the left, car (13) on the right
        assert_eq!(item.mask[0], IGNORE_INDEX as i64);
        assert_eq!(item.mask[8], 0);
        assert_eq!(item.mask[15], 13);
    }

    #[test]
    fn test_train_item_has_crop_size() {
        let tmp = tempfile::tempdir().unwrap();
        write_fake_split(tmp.path(), "train", &["aachen"], 1, 32, 16);
        let samples = CityscapesLoader::new(tmp.path(), "train").load_all().unwrap();

        let transform = SegTransform::Train {
            flip: RandomHorizontalFlip::new(0.5),
            crop: RandomResizedCrop::new((8, 12), (0.25, 1.0), (0.75, 1.333)),
        };
        let ds   = SegDataset::new(samples, transform, 19, IGNORE_INDEX);
        let item = ds.get(0).unwrap();
        assert_eq!((item.height, item.width), (8, 12));
        assert!(item.mask.iter().all(|&v| v == 0 || v == 13 || v == IGNORE_INDEX as i64));
    }

    fn crop_transform() -> SegTransform {
        SegTransform::Train {
            flip: RandomHorizontalFlip::new(0.5),
            crop: RandomResizedCrop::new((6, 6), (0.1, 0.5), (0.75, 1.333)),
        }
    }

    #[test]
    fn test_augmentation_follows_seed() {
        let tmp = tempfile::tempdir().unwrap();
        write_fake_split(tmp.path(), "train", &["aachen"], 1, 32, 32);
        let samples = CityscapesLoader::new(tmp.path(), "train").load_all().unwrap();

        let a = SegDataset::new(samples.clone(), crop_transform(), 19, IGNORE_INDEX).with_seed(3);
        let b = SegDataset::new(samples, crop_transform(), 19, IGNORE_INDEX).with_seed(3);

        // Same seed, same sequence of reads: identical crops
        for _ in 0..3 {
            assert_eq!(a.get(0).unwrap().image, b.get(0).unwrap().image);
        }
        // Later epochs draw fresh windows
        let epochs: Vec<Vec<f32>> = (0..6).map(|_| a.get(0).unwrap().image).collect();
        assert!(epochs.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_classes_without_output_channel_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        write_fake_split(tmp.path(), "val", &["lindau"], 1, 8, 4);
        let samples = CityscapesLoader::new(tmp.path(), "val").load_all().unwrap();

        // car is trainId 13, beyond a 5-class head
        let ds   = SegDataset::new(samples, SegTransform::Eval { resize: None }, 5, IGNORE_INDEX);
        let item = ds.get(0).unwrap();
        assert_eq!(item.mask[8], 0);
        assert_eq!(item.mask[15], IGNORE_INDEX as i64);
    }

    #[test]
    fn test_out_of_range_and_unreadable_give_none() {
        let tmp = tempfile::tempdir().unwrap();
        let bad = SamplePaths::new(tmp.path().join("nope.png"), tmp.path().join("nope_mask.png"));
        let ds  = SegDataset::new(
            vec![bad],
            SegTransform::Eval { resize: Some(Resize { size: (4, 4) }) },
            19,
            IGNORE_INDEX,
        );
        assert_eq!(ds.len(), 1);
        assert!(ds.get(0).is_none());
        assert!(ds.get(5).is_none());
    }
}

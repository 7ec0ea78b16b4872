// ============================================================
// Layer 4: Segmentation Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<SegItem> into
// device tensors.
//
//   Input:  N SegItems, each image 3xHxW (CHW, flat) + mask HxW
//   Output: images [N, 3, H, W] (float), masks [N, H, W] (int)
//
// All items in a batch share H and W: training crops to a fixed
// size and evaluation either resizes or relies on the source
// images having one size.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::SegItem;

// ─── SegBatch ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct SegBatch<B: Backend> {
    /// Normalised images, shape [batch, 3, height, width]
    pub images: Tensor<B, 4>,

    /// trainId per pixel, shape [batch, height, width]
    pub masks: Tensor<B, 3, Int>,
}

// ─── SegBatcher ───────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct SegBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SegBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<SegItem, SegBatch<B>> for SegBatcher<B> {
    fn batch(&self, items: Vec<SegItem>) -> SegBatch<B> {
        let batch_size      = items.len();
        let (height, width) = (items[0].height, items[0].width);

        assert!(
            items.iter().all(|i| i.height == height && i.width == width),
            "all samples in a batch must share one size; set a crop or eval size"
        );

        let images: Vec<f32> = items.iter().flat_map(|i| i.image.iter().copied()).collect();
        let masks:  Vec<i64> = items.iter().flat_map(|i| i.mask.iter().copied()).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images, [batch_size, 3, height, width]),
            &self.device,
        );
        let masks = Tensor::<B, 3, Int>::from_data(
            TensorData::new(masks, [batch_size, height, width]),
            &self.device,
        );

        SegBatch { images, masks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn item(value: f32, class: i64) -> SegItem {
        SegItem {
            image:  vec![value; 3 * 2 * 4],
            mask:   vec![class; 2 * 4],
            height: 2,
            width:  4,
        }
    }

    #[test]
    fn test_batch_shapes_and_order() {
        let batcher = SegBatcher::<NdArray>::new(Default::default());
        let batch   = batcher.batch(vec![item(0.5, 1), item(-1.0, 7)]);

        assert_eq!(batch.images.dims(), [2, 3, 2, 4]);
        assert_eq!(batch.masks.dims(),  [2, 2, 4]);

        let masks: Vec<i64> = batch.masks.into_data().iter::<i64>().collect();
        assert_eq!(masks[0], 1);
        assert_eq!(masks[8], 7);
    }

    #[test]
    #[should_panic]
    fn test_mixed_sizes_are_rejected() {
        let batcher = SegBatcher::<NdArray>::new(Default::default());
        let mut odd = item(0.0, 0);
        odd.width   = 3;
        odd.image.truncate(3 * 2 * 3);
        odd.mask.truncate(2 * 3);
        let _ = batcher.batch(vec![item(0.0, 0), odd]);
    }
}

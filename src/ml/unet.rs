// UNet: four max-pool down stages, four transposed-conv up stages.
// Skip connections are pushed onto a stack on the way down and popped
// on the way up, so the deepest skip meets the first up stage.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

use crate::ml::layers::{resize_to, spatial, ConvBnRelu, ConvBnReluConfig};
use crate::ml::model::SegmentationModel;

const DEPTH: usize = 4;

#[derive(Config, Debug)]
pub struct UNetConfig {
    pub num_classes: usize,
    #[config(default = 3)]
    pub in_channels: usize,
    #[config(default = 64)]
    pub base_channels: usize,
}

impl UNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        let width = |level: usize| self.base_channels << level;

        let downs = (0..DEPTH)
            .map(|level| DoubleConvConfig::new(width(level), width(level + 1)).init(device))
            .collect();

        let ups = (0..DEPTH)
            .rev()
            .map(|level| {
                let (deep, shallow) = (width(level + 1), width(level));
                UpStage {
                    up: ConvTranspose2dConfig::new([deep, shallow], [2, 2])
                        .with_stride([2, 2])
                        .init(device),
                    conv: DoubleConvConfig::new(shallow * 2, shallow).init(device),
                }
            })
            .collect();

        UNet {
            input: DoubleConvConfig::new(self.in_channels, width(0)).init(device),
            pool:  MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            downs,
            ups,
            output: Conv2dConfig::new([width(0), self.num_classes], [1, 1]).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    input:  DoubleConv<B>,
    pool:   MaxPool2d,
    downs:  Vec<DoubleConv<B>>,
    ups:    Vec<UpStage<B>>,
    output: Conv2d<B>,
}

impl<B: Backend> SegmentationModel<B> for UNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(DEPTH);
        let mut x     = self.input.forward(images);

        for down in &self.downs {
            skips.push(x.clone());
            x = down.forward(self.pool.forward(x));
        }

        for stage in &self.ups {
            let Some(skip) = skips.pop() else { break };
            x = stage.forward(x, skip);
        }

        self.output.forward(x)
    }
}

// ─── Building blocks ──────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct DoubleConvConfig {
    pub in_channels:  usize,
    pub out_channels: usize,
}

impl DoubleConvConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DoubleConv<B> {
        DoubleConv {
            first: ConvBnReluConfig::new(self.in_channels, self.out_channels)
                .with_kernel_size(3)
                .init(device),
            second: ConvBnReluConfig::new(self.out_channels, self.out_channels)
                .with_kernel_size(3)
                .init(device),
        }
    }
}

/// (3x3 conv → BN → ReLU) x 2
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    first:  ConvBnRelu<B>,
    second: ConvBnRelu<B>,
}

impl<B: Backend> DoubleConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.second.forward(self.first.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct UpStage<B: Backend> {
    up:   ConvTranspose2d<B>,
    conv: DoubleConv<B>,
}

impl<B: Backend> UpStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        // Odd sizes lose a row/column to pooling; stretch back to the skip.
        let x = resize_to(self.up.forward(x), spatial(&skip));
        self.conv.forward(Tensor::cat(vec![skip, x], 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_logits_match_input_size() {
        let device = Default::default();
        let model  = UNetConfig::new(19).with_base_channels(4).init::<NdArray>(&device);
        let out    = model.forward(Tensor::zeros([2, 3, 32, 48], &device));
        assert_eq!(out.dims(), [2, 19, 32, 48]);
    }

    #[test]
    fn test_sizes_not_divisible_by_sixteen() {
        let device = Default::default();
        let model  = UNetConfig::new(3).with_base_channels(2).init::<NdArray>(&device);
        let out    = model.forward(Tensor::zeros([1, 3, 20, 27], &device));
        assert_eq!(out.dims(), [1, 3, 20, 27]);
    }
}

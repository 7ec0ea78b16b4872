// ============================================================
// Layer 5: Atrous Spatial Pyramid Pooling
// ============================================================
// Five parallel branches over the backbone output:
//
//   1x1 conv
//   3x3 atrous conv at rates r1, r2, r3
//   global average pool → 1x1 conv → broadcast back
//
// Concatenated, projected back to `out_channels`, then dropout.

use burn::{
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig,
    },
    prelude::*,
};

use crate::ml::layers::{resize_to, spatial, ConvBnRelu, ConvBnReluConfig};

/// Dilation rates of the three atrous branches for a backbone
/// output stride. `None` for unsupported strides.
pub fn atrous_rates(output_stride: usize) -> Option<[usize; 3]> {
    match output_stride {
        16 => Some([6, 12, 18]),
        8 => Some([12, 24, 36]),
        _ => None,
    }
}

#[derive(Config, Debug)]
pub struct AsppConfig {
    pub in_channels: usize,
    #[config(default = 256)]
    pub out_channels: usize,
    #[config(default = 16)]
    pub output_stride: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl AsppConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Aspp<B> {
        let Some(rates) = atrous_rates(self.output_stride) else {
            panic!(
                "Unsupported output_stride: {}. Only 8 and 16 are supported.",
                self.output_stride
            );
        };

        let branch = |kernel_size, dilation| {
            ConvBnReluConfig::new(self.in_channels, self.out_channels)
                .with_kernel_size(kernel_size)
                .with_dilation(dilation)
                .init(device)
        };

        Aspp {
            conv1x1: branch(1, 1),
            atrous:  rates.iter().map(|&rate| branch(3, rate)).collect(),
            pool:    AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            pool_conv: branch(1, 1),
            project: ConvBnReluConfig::new(self.out_channels * 5, self.out_channels).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct Aspp<B: Backend> {
    conv1x1:   ConvBnRelu<B>,
    atrous:    Vec<ConvBnRelu<B>>,
    pool:      AdaptiveAvgPool2d,
    pool_conv: ConvBnRelu<B>,
    project:   ConvBnRelu<B>,
    dropout:   Dropout,
}

impl<B: Backend> Aspp<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let size = spatial(&x);

        let mut branches = Vec::with_capacity(5);
        branches.push(self.conv1x1.forward(x.clone()));
        for conv in &self.atrous {
            branches.push(conv.forward(x.clone()));
        }
        let pooled = self.pool_conv.forward(self.pool.forward(x));
        branches.push(resize_to(pooled, size));

        self.dropout.forward(self.project.forward(Tensor::cat(branches, 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_rates_per_output_stride() {
        assert_eq!(atrous_rates(16), Some([6, 12, 18]));
        assert_eq!(atrous_rates(8),  Some([12, 24, 36]));
        assert_eq!(atrous_rates(32), None);
    }

    #[test]
    fn test_keeps_spatial_size() {
        let device = Default::default();
        let aspp   = AsppConfig::new(16).with_out_channels(8).init::<NdArray>(&device);
        let out    = aspp.forward(Tensor::ones([2, 16, 5, 7], &device));
        assert_eq!(out.dims(), [2, 8, 5, 7]);
    }

    #[test]
    #[should_panic(expected = "Unsupported output_stride")]
    fn test_bad_output_stride_panics() {
        let _ = AsppConfig::new(16).with_output_stride(4).init::<NdArray>(&Default::default());
    }
}

// Aligned Xception-65.
//
// entry:  conv 3→32 /2, conv 32→64, block1 →128 /2,
//         block2 →256 /2 (tap), block3 →728 /2 or /1 (tap)
// middle: N residual blocks of three 728-wide separable convs
// exit:   block 728→1024, then separable convs →1536 →1536 →2048
//
// Output stride 8 keeps block3 at stride 1 and doubles every later
// dilation. Taps are taken after the second separable conv of block2
// and block3, i.e. just before each block's strided conv.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Relu,
    },
    prelude::*,
};

use super::BackboneFeatures;
use crate::ml::layers::{scaled, ConvBnRelu, ConvBnReluConfig};

#[derive(Config, Debug)]
pub struct XceptionConfig {
    #[config(default = 16)]
    pub middle_blocks: usize,
    #[config(default = 16)]
    pub output_stride: usize,
    #[config(default = 1)]
    pub width_divisor: usize,
}

struct FlowPlan {
    entry_stride:    usize,
    middle_dilation: usize,
    exit_dilations:  [usize; 2],
}

impl XceptionConfig {
    fn plan(&self) -> FlowPlan {
        match self.output_stride {
            16 => FlowPlan { entry_stride: 2, middle_dilation: 1, exit_dilations: [1, 2] },
            8  => FlowPlan { entry_stride: 1, middle_dilation: 2, exit_dilations: [2, 4] },
            os => panic!("Unsupported output_stride: {os}. Only 8 and 16 are supported."),
        }
    }

    fn c(&self, channels: usize) -> usize {
        scaled(channels, self.width_divisor)
    }

    pub fn channels(&self) -> (usize, [usize; 2]) {
        (self.c(2048), [self.c(256), self.c(728)])
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Xception<B> {
        let plan = self.plan();
        let c    = |n| self.c(n);

        let block = |input, outs: [usize; 3], stride, dilation, start_with_relu| {
            XceptionBlockConfig::new(input, outs.map(c))
                .with_stride(stride)
                .with_dilation(dilation)
                .with_start_with_relu(start_with_relu)
                .init(device)
        };

        Xception {
            conv1: ConvBnReluConfig::new(3, c(32)).with_kernel_size(3).with_stride(2).init(device),
            conv2: ConvBnReluConfig::new(c(32), c(64)).with_kernel_size(3).init(device),

            block1: block(c(64),  [128; 3], 2, 1, false),
            block2: block(c(128), [256; 3], 2, 1, true),
            block3: block(c(256), [728; 3], plan.entry_stride, 1, true),

            middle: (0..self.middle_blocks)
                .map(|_| block(c(728), [728; 3], 1, plan.middle_dilation, true))
                .collect(),

            exit_block: block(c(728), [728, 1024, 1024], 1, plan.exit_dilations[0], true),
            exit_convs: [(1024, 1536), (1536, 1536), (1536, 2048)]
                .into_iter()
                .map(|(i, o)| SepUnitConfig::new(c(i), c(o), plan.exit_dilations[1]).init(device))
                .collect(),
            relu: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct Xception<B: Backend> {
    conv1:      ConvBnRelu<B>,
    conv2:      ConvBnRelu<B>,
    block1:     XceptionBlock<B>,
    block2:     XceptionBlock<B>,
    block3:     XceptionBlock<B>,
    middle:     Vec<XceptionBlock<B>>,
    exit_block: XceptionBlock<B>,
    exit_convs: Vec<SepUnit<B>>,
    relu:       Relu,
}

impl<B: Backend> Xception<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> BackboneFeatures<B> {
        let x = self.conv2.forward(self.conv1.forward(x));
        let (x, _)    = self.block1.forward(x);
        let (x, low1) = self.block2.forward(x);
        let (x, low2) = self.block3.forward(x);

        let x = self.middle.iter().fold(x, |x, block| block.forward(x).0);
        let (x, _) = self.exit_block.forward(x);

        // Exit convs are post-activated, unlike the pre-activated blocks.
        let out = self
            .exit_convs
            .iter()
            .fold(x, |x, unit| self.relu.forward(unit.forward(x)));

        BackboneFeatures {
            out,
            low_level: vec![low1, low2],
        }
    }
}

// ─── Separable convolution ────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct SepUnitConfig {
    pub in_channels:  usize,
    pub out_channels: usize,
    pub dilation:     usize,
    #[config(default = 1)]
    pub stride: usize,
    #[config(default = false)]
    pub pre_relu: bool,
}

impl SepUnitConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SepUnit<B> {
        SepUnit {
            relu: self.pre_relu.then(Relu::new),
            depthwise: ConvBnReluConfig::new(self.in_channels, self.in_channels)
                .with_kernel_size(3)
                .with_stride(self.stride)
                .with_dilation(self.dilation)
                .with_groups(self.in_channels)
                .with_relu(false)
                .init(device),
            pointwise: Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(self.out_channels).init(device),
        }
    }
}

/// [ReLU] → depthwise 3x3 + BN → pointwise 1x1 → BN
#[derive(Module, Debug)]
pub struct SepUnit<B: Backend> {
    relu:      Option<Relu>,
    depthwise: ConvBnRelu<B>,
    pointwise: Conv2d<B>,
    bn:        BatchNorm<B, 2>,
}

impl<B: Backend> SepUnit<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.relu {
            Some(relu) => relu.forward(x),
            None => x,
        };
        self.bn.forward(self.pointwise.forward(self.depthwise.forward(x)))
    }
}

// ─── Residual block ───────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct XceptionBlockConfig {
    pub in_channels: usize,
    /// Output width of each of the three separable convs
    pub out_channels: [usize; 3],
    #[config(default = 1)]
    pub stride: usize,
    #[config(default = 1)]
    pub dilation: usize,
    #[config(default = true)]
    pub start_with_relu: bool,
}

impl XceptionBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> XceptionBlock<B> {
        let [c1, c2, c3] = self.out_channels;
        let units = [(self.in_channels, c1, 1), (c1, c2, 1), (c2, c3, self.stride)]
            .into_iter()
            .enumerate()
            .map(|(i, (cin, cout, stride))| {
                SepUnitConfig::new(cin, cout, self.dilation)
                    .with_stride(stride)
                    .with_pre_relu(i > 0 || self.start_with_relu)
                    .init(device)
            })
            .collect();

        let skip = (self.stride != 1 || self.in_channels != c3).then(|| {
            ConvBnReluConfig::new(self.in_channels, c3)
                .with_stride(self.stride)
                .with_relu(false)
                .init(device)
        });

        XceptionBlock { units, skip }
    }
}

#[derive(Module, Debug)]
pub struct XceptionBlock<B: Backend> {
    units: Vec<SepUnit<B>>,
    skip:  Option<ConvBnRelu<B>>,
}

impl<B: Backend> XceptionBlock<B> {
    /// Returns the block output and the activation after the second unit.
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let shortcut = match &self.skip {
            Some(skip) => skip.forward(x.clone()),
            None => x.clone(),
        };

        let mut tap = x.clone();
        let mut out = x;
        for (i, unit) in self.units.iter().enumerate() {
            out = unit.forward(out);
            if i == 1 {
                tap = out.clone();
            }
        }
        (out + shortcut, tap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::ml::layers::spatial;

    fn tiny(output_stride: usize) -> XceptionConfig {
        XceptionConfig::new()
            .with_middle_blocks(1)
            .with_output_stride(output_stride)
            .with_width_divisor(16)
    }

    #[test]
    fn test_output_stride_16_shapes() {
        let device = Default::default();
        let cfg    = tiny(16);
        let feats  = cfg.init::<NdArray>(&device).forward(Tensor::zeros([1, 3, 64, 64], &device));

        let (high, low) = cfg.channels();
        assert_eq!(feats.out.dims(), [1, high, 4, 4]);
        assert_eq!(feats.low_level[0].dims(), [1, low[0], 16, 16]);
        assert_eq!(feats.low_level[1].dims(), [1, low[1], 8, 8]);
    }

    #[test]
    fn test_output_stride_8_shapes() {
        let device = Default::default();
        let feats  = tiny(8).init::<NdArray>(&device).forward(Tensor::zeros([1, 3, 64, 64], &device));
        assert_eq!(spatial(&feats.out), [8, 8]);
        assert_eq!(spatial(&feats.low_level[1]), [8, 8]);
    }

    #[test]
    fn test_block_tap_precedes_stride() {
        let device = Default::default();
        let block  = XceptionBlockConfig::new(4, [8, 8, 8])
            .with_stride(2)
            .init::<NdArray>(&device);
        let (out, tap) = block.forward(Tensor::zeros([1, 4, 10, 10], &device));
        assert_eq!(out.dims(), [1, 8, 5, 5]);
        assert_eq!(tap.dims(), [1, 8, 10, 10]);
    }
}

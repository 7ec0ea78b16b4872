// ResNet with bottleneck blocks (ResNet101 by default: [3, 4, 23, 3]).
//
// Dilated for segmentation: once the requested output stride is
// reached, later stages keep stride 1 and grow their dilation instead,
// so the receptive field still expands without shrinking the map.
//
//   output stride 16: strides [1, 2, 2, 1], dilations [1, 1, 1, 2]
//   output stride  8: strides [1, 2, 1, 1], dilations [1, 1, 2, 4]
//
// Low-level features: layer1 (stride 4) and layer2 (stride 8) outputs.

use burn::{
    nn::{
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d, Relu,
    },
    prelude::*,
};

use super::BackboneFeatures;
use crate::ml::layers::{scaled, ConvBnRelu, ConvBnReluConfig};

const EXPANSION: usize = 4;
const STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];

#[derive(Config, Debug)]
pub struct ResNetConfig {
    #[config(default = "[3, 4, 23, 3]")]
    pub blocks: [usize; 4],
    #[config(default = 16)]
    pub output_stride: usize,
    #[config(default = 1)]
    pub width_divisor: usize,
}

impl ResNetConfig {
    fn plan(&self) -> ([usize; 4], [usize; 4]) {
        match self.output_stride {
            16 => ([1, 2, 2, 1], [1, 1, 1, 2]),
            8  => ([1, 2, 1, 1], [1, 1, 2, 4]),
            os => panic!("Unsupported output_stride: {os}. Only 8 and 16 are supported."),
        }
    }

    /// (high-level channels, [layer1 channels, layer2 channels])
    pub fn channels(&self) -> (usize, [usize; 2]) {
        let c = |planes| scaled(planes, self.width_divisor) * EXPANSION;
        (c(STAGE_PLANES[3]), [c(STAGE_PLANES[0]), c(STAGE_PLANES[1])])
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let (strides, dilations) = self.plan();
        let stem_channels = scaled(64, self.width_divisor);

        let stem = ConvBnReluConfig::new(3, stem_channels)
            .with_kernel_size(7)
            .with_stride(2)
            .init(device);
        let pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut in_channels = stem_channels;
        let mut stages: Vec<Vec<Bottleneck<B>>> = Vec::with_capacity(4);
        for i in 0..4 {
            let planes = scaled(STAGE_PLANES[i], self.width_divisor);
            let stage  = (0..self.blocks[i])
                .map(|b| {
                    let stride = if b == 0 { strides[i] } else { 1 };
                    let block  = BottleneckConfig::new(in_channels, planes, stride, dilations[i]).init(device);
                    in_channels = planes * EXPANSION;
                    block
                })
                .collect();
            stages.push(stage);
        }

        let mut stages = stages.into_iter();
        ResNet {
            stem,
            pool,
            layer1: stages.next().unwrap_or_default(),
            layer2: stages.next().unwrap_or_default(),
            layer3: stages.next().unwrap_or_default(),
            layer4: stages.next().unwrap_or_default(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    stem:   ConvBnRelu<B>,
    pool:   MaxPool2d,
    layer1: Vec<Bottleneck<B>>,
    layer2: Vec<Bottleneck<B>>,
    layer3: Vec<Bottleneck<B>>,
    layer4: Vec<Bottleneck<B>>,
}

fn run_stage<B: Backend>(stage: &[Bottleneck<B>], x: Tensor<B, 4>) -> Tensor<B, 4> {
    stage.iter().fold(x, |x, block| block.forward(x))
}

impl<B: Backend> ResNet<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> BackboneFeatures<B> {
        let x  = self.pool.forward(self.stem.forward(x));
        let l1 = run_stage(&self.layer1, x);
        let l2 = run_stage(&self.layer2, l1.clone());
        let l3 = run_stage(&self.layer3, l2.clone());
        let out = run_stage(&self.layer4, l3);

        BackboneFeatures {
            out,
            low_level: vec![l1, l2],
        }
    }
}

// ─── Bottleneck ───────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct BottleneckConfig {
    pub in_channels: usize,
    pub planes:      usize,
    pub stride:      usize,
    pub dilation:    usize,
}

impl BottleneckConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Bottleneck<B> {
        let out_channels = self.planes * EXPANSION;
        let downsample = (self.stride != 1 || self.in_channels != out_channels).then(|| {
            ConvBnReluConfig::new(self.in_channels, out_channels)
                .with_stride(self.stride)
                .with_relu(false)
                .init(device)
        });

        Bottleneck {
            reduce: ConvBnReluConfig::new(self.in_channels, self.planes).init(device),
            conv: ConvBnReluConfig::new(self.planes, self.planes)
                .with_kernel_size(3)
                .with_stride(self.stride)
                .with_dilation(self.dilation)
                .init(device),
            expand: ConvBnReluConfig::new(self.planes, out_channels)
                .with_relu(false)
                .init(device),
            downsample,
            relu: Relu::new(),
        }
    }
}

/// 1x1 reduce -> 3x3 (strided / dilated) -> 1x1 expand, plus shortcut
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    reduce:     ConvBnRelu<B>,
    conv:       ConvBnRelu<B>,
    expand:     ConvBnRelu<B>,
    downsample: Option<ConvBnRelu<B>>,
    relu:       Relu,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(down) => down.forward(x.clone()),
            None => x.clone(),
        };
        let out = self.expand.forward(self.conv.forward(self.reduce.forward(x)));
        self.relu.forward(out + identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::ml::layers::spatial;

    fn tiny(output_stride: usize) -> ResNetConfig {
        ResNetConfig::new()
            .with_blocks([1, 1, 2, 1])
            .with_output_stride(output_stride)
            .with_width_divisor(16)
    }

    #[test]
    fn test_default_is_resnet101() {
        let cfg = ResNetConfig::new();
        assert_eq!(cfg.blocks, [3, 4, 23, 3]);
        assert_eq!(cfg.channels(), (2048, [256, 512]));
    }

    #[test]
    fn test_output_stride_16_feature_sizes() {
        let device = Default::default();
        let cfg    = tiny(16);
        let net    = cfg.init::<NdArray>(&device);
        let feats  = net.forward(Tensor::zeros([1, 3, 64, 64], &device));

        let (high, low) = cfg.channels();
        assert_eq!(feats.out.dims(), [1, high, 4, 4]);
        assert_eq!(feats.low_level.len(), 2);
        assert_eq!(feats.low_level[0].dims()[1], low[0]);
        assert_eq!(spatial(&feats.low_level[0]), [16, 16]);
        assert_eq!(feats.low_level[1].dims()[1], low[1]);
        assert_eq!(spatial(&feats.low_level[1]), [8, 8]);
    }

    #[test]
    fn test_output_stride_8_keeps_resolution() {
        let device = Default::default();
        let net    = tiny(8).init::<NdArray>(&device);
        let feats  = net.forward(Tensor::zeros([1, 3, 64, 64], &device));
        assert_eq!(spatial(&feats.out), [8, 8]);
    }

    #[test]
    #[should_panic]
    fn test_unsupported_output_stride_panics() {
        let _ = tiny(32).init::<NdArray>(&Default::default());
    }
}

// ============================================================
// DeepLab decoders
// ============================================================
// Both decoders walk the backbone's low-level stack deepest
// first. Each stage:
//
//   low = compress(stack.pop())      1x1 conv + BN + ReLU
//   x   = upsample(x, size(low))     bilinear
//   x   = fuse(x, low)
//
// Proposed:  fuse = concat → 5x5 conv + BN + ReLU
// Attention: fuse = AttentionBlock (channel + spatial gates)
//
// A 1x1 classifier maps the final map to class logits. Running
// out of low-level features simply ends the stage loop early.

use burn::{
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
};

use crate::ml::attention::{AttentionBlock, AttentionBlockConfig};
use crate::ml::layers::{resize_to, spatial, ConvBnRelu, ConvBnReluConfig};

fn classifier<B: Backend>(channels: usize, num_classes: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([channels, num_classes], [1, 1]).init(device)
}

// ─── Concatenation decoder ────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct ProposedDecoderConfig {
    /// Channels of the incoming ASPP output
    pub in_channels: usize,
    /// Low-level channels, shallow → deep (stack order)
    pub low_channels: [usize; 2],
    pub num_classes: usize,
    #[config(default = 256)]
    pub decoder_channels: usize,
    /// Compressed width per stage, deep stage first
    #[config(default = "[64, 32]")]
    pub compress_channels: [usize; 2],
}

impl ProposedDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ProposedDecoder<B> {
        let mut x_channels = self.in_channels;
        let stages = self
            .low_channels
            .iter()
            .rev()
            .zip(self.compress_channels)
            .map(|(&low, compressed)| {
                let stage = ConcatStage {
                    compress: ConvBnReluConfig::new(low, compressed).init(device),
                    decode: ConvBnReluConfig::new(x_channels + compressed, self.decoder_channels)
                        .with_kernel_size(5)
                        .init(device),
                };
                x_channels = self.decoder_channels;
                stage
            })
            .collect();

        ProposedDecoder {
            stages,
            classifier: classifier(x_channels, self.num_classes, device),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConcatStage<B: Backend> {
    compress: ConvBnRelu<B>,
    decode:   ConvBnRelu<B>,
}

#[derive(Module, Debug)]
pub struct ProposedDecoder<B: Backend> {
    stages:     Vec<ConcatStage<B>>,
    classifier: Conv2d<B>,
}

impl<B: Backend> ProposedDecoder<B> {
    pub fn forward(&self, mut x: Tensor<B, 4>, mut low_level: Vec<Tensor<B, 4>>) -> Tensor<B, 4> {
        for stage in &self.stages {
            let Some(low) = low_level.pop() else { break };
            let low = stage.compress.forward(low);
            x = resize_to(x, spatial(&low));
            x = stage.decode.forward(Tensor::cat(vec![x, low], 1));
        }
        self.classifier.forward(x)
    }
}

// ─── Attention decoder ────────────────────────────────────────────────────────
/// `in_channels` must equal `decoder_channels`: the fusion adds the
/// upsampled map to the compressed skip.
#[derive(Config, Debug)]
pub struct AttentionDecoderConfig {
    pub low_channels: [usize; 2],
    pub num_classes:  usize,
    #[config(default = 256)]
    pub decoder_channels: usize,
}

impl AttentionDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionDecoder<B> {
        let stages = self
            .low_channels
            .iter()
            .rev()
            .map(|&low| AttentionStage {
                compress:  ConvBnReluConfig::new(low, self.decoder_channels).init(device),
                attention: AttentionBlockConfig::new(self.decoder_channels).init(device),
            })
            .collect();

        AttentionDecoder {
            stages,
            classifier: classifier(self.decoder_channels, self.num_classes, device),
        }
    }
}

#[derive(Module, Debug)]
pub struct AttentionStage<B: Backend> {
    compress:  ConvBnRelu<B>,
    attention: AttentionBlock<B>,
}

#[derive(Module, Debug)]
pub struct AttentionDecoder<B: Backend> {
    stages:     Vec<AttentionStage<B>>,
    classifier: Conv2d<B>,
}

impl<B: Backend> AttentionDecoder<B> {
    pub fn forward(&self, mut x: Tensor<B, 4>, mut low_level: Vec<Tensor<B, 4>>) -> Tensor<B, 4> {
        for stage in &self.stages {
            let Some(low) = low_level.pop() else { break };
            let low = stage.compress.forward(low);
            x = resize_to(x, spatial(&low));
            x = stage.attention.forward(x, low);
        }
        self.classifier.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn stack(device: &<B as Backend>::Device) -> Vec<Tensor<B, 4>> {
        // shallow (stride 4) then deep (stride 8)
        vec![
            Tensor::ones([1, 6, 16, 16], device),
            Tensor::ones([1, 10, 8, 8], device),
        ]
    }

    #[test]
    fn test_proposed_decoder_ends_at_shallowest_size() {
        let device  = Default::default();
        let decoder = ProposedDecoderConfig::new(12, [6, 10], 5)
            .with_decoder_channels(16)
            .with_compress_channels([4, 2])
            .init::<B>(&device);

        let x   = Tensor::ones([1, 12, 4, 4], &device);
        let out = decoder.forward(x, stack(&device));
        assert_eq!(out.dims(), [1, 5, 16, 16]);
    }

    #[test]
    fn test_attention_decoder_ends_at_shallowest_size() {
        let device  = Default::default();
        let decoder = AttentionDecoderConfig::new([6, 10], 3)
            .with_decoder_channels(8)
            .init::<B>(&device);

        let x   = Tensor::ones([2, 8, 4, 4], &device);
        let low = stack(&device).into_iter().map(|t| t.repeat_dim(0, 2)).collect();
        assert_eq!(decoder.forward(x, low).dims(), [2, 3, 16, 16]);
    }

    #[test]
    fn test_short_stack_stops_early() {
        let device  = Default::default();
        let decoder = AttentionDecoderConfig::new([6, 10], 3)
            .with_decoder_channels(8)
            .init::<B>(&device);

        let x   = Tensor::ones([1, 8, 4, 4], &device);
        let low = vec![Tensor::ones([1, 10, 8, 8], &device)];
        assert_eq!(decoder.forward(x, low).dims(), [1, 3, 8, 8]);
    }
}

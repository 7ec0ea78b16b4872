use burn::prelude::*;

use crate::ml::aspp::{Aspp, AsppConfig};
use crate::ml::backbone::{Backbone, BackboneConfig};
use crate::ml::decoder::{
    AttentionDecoder, AttentionDecoderConfig, ProposedDecoder, ProposedDecoderConfig,
};
use crate::ml::layers::{resize_to, scaled, spatial};
use crate::ml::model::SegmentationModel;

/// Shared hyper-parameters of the two DeepLabv3+ variants.
#[derive(Config, Debug)]
pub struct DeepLabConfig {
    pub backbone:    BackboneConfig,
    pub num_classes: usize,
    /// Width of the ASPP output and every decoder stage
    #[config(default = 256)]
    pub decoder_channels: usize,
}

impl DeepLabConfig {
    fn aspp(&self) -> AsppConfig {
        let (high, _) = self.backbone.channels();
        AsppConfig::new(high)
            .with_out_channels(self.decoder_channels)
            .with_output_stride(self.backbone.output_stride)
    }

    /// DeepLabv3+ with the concatenation decoder.
    pub fn init_proposed<B: Backend>(&self, device: &B::Device) -> Proposed<B> {
        let (_, low) = self.backbone.channels();
        let divisor  = self.backbone.width_divisor;
        Proposed {
            backbone: self.backbone.init(device),
            aspp:     self.aspp().init(device),
            decoder:  ProposedDecoderConfig::new(self.decoder_channels, low, self.num_classes)
                .with_decoder_channels(self.decoder_channels)
                .with_compress_channels([scaled(64, divisor), scaled(32, divisor)])
                .init(device),
        }
    }

    /// DeepLabv3+ with attention-gated decoder stages.
    pub fn init_attention<B: Backend>(&self, device: &B::Device) -> AttentionDeepLabV3Plus<B> {
        let (_, low) = self.backbone.channels();
        AttentionDeepLabV3Plus {
            backbone: self.backbone.init(device),
            aspp:     self.aspp().init(device),
            decoder:  AttentionDecoderConfig::new(low, self.num_classes)
                .with_decoder_channels(self.decoder_channels)
                .init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct Proposed<B: Backend> {
    backbone: Backbone<B>,
    aspp:     Aspp<B>,
    decoder:  ProposedDecoder<B>,
}

impl<B: Backend> SegmentationModel<B> for Proposed<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let size  = spatial(&images);
        let feats = self.backbone.forward(images);
        let x     = self.aspp.forward(feats.out);
        resize_to(self.decoder.forward(x, feats.low_level), size)
    }
}

#[derive(Module, Debug)]
pub struct AttentionDeepLabV3Plus<B: Backend> {
    backbone: Backbone<B>,
    aspp:     Aspp<B>,
    decoder:  AttentionDecoder<B>,
}

impl<B: Backend> SegmentationModel<B> for AttentionDeepLabV3Plus<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let size  = spatial(&images);
        let feats = self.backbone.forward(images);
        let x     = self.aspp.forward(feats.out);
        resize_to(self.decoder.forward(x, feats.low_level), size)
    }
}

use burn::prelude::*;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::ml::backbone::BackboneConfig;
use crate::ml::deeplab::DeepLabConfig;
use crate::ml::unet::UNetConfig;

/// Any network mapping images [N, 3, H, W] to class logits
/// [N, num_classes, H, W] at the input resolution.
pub trait SegmentationModel<B: Backend>: Module<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum ModelKind {
    #[default]
    #[serde(rename = "unet")]
    #[value(name = "unet")]
    UNet,
    #[serde(rename = "proposed")]
    #[value(name = "proposed")]
    Proposed,
    #[serde(rename = "attention-deeplabv3plus")]
    #[value(name = "attention-deeplabv3plus")]
    AttentionDeepLabV3Plus,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::UNet                   => "unet",
            ModelKind::Proposed               => "proposed",
            ModelKind::AttentionDeepLabV3Plus => "attention_deeplabv3plus",
        }
    }

    /// File stem of the best-mIoU checkpoint, e.g. `unet_best`
    pub fn checkpoint_name(&self) -> String {
        format!("{}_best", self.name())
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Architecture configs from a training config ──────────────────────────────
pub fn unet_config(cfg: &TrainConfig) -> UNetConfig {
    UNetConfig::new(cfg.num_classes).with_base_channels(cfg.unet_base_channels)
}

pub fn deeplab_config(cfg: &TrainConfig) -> DeepLabConfig {
    let backbone = BackboneConfig::new(cfg.backbone)
        .with_output_stride(cfg.output_stride)
        .with_width_divisor(cfg.width_divisor);
    DeepLabConfig::new(backbone, cfg.num_classes).with_decoder_channels(cfg.decoder_channels)
}

/// Work that needs a concrete model type. Lets inference-side code
/// pick the architecture at runtime and still stay generic.
pub trait ModelTask<B: Backend> {
    type Output;
    fn run<M: SegmentationModel<B>>(self, model: M) -> Self::Output;
}

/// Build the architecture described by `cfg` and hand it to `task`.
pub fn with_model<B: Backend, T: ModelTask<B>>(
    cfg:    &TrainConfig,
    device: &B::Device,
    task:   T,
) -> T::Output {
    match cfg.model {
        ModelKind::UNet                   => task.run(unet_config(cfg).init::<B>(device)),
        ModelKind::Proposed               => task.run(deeplab_config(cfg).init_proposed::<B>(device)),
        ModelKind::AttentionDeepLabV3Plus => task.run(deeplab_config(cfg).init_attention::<B>(device)),
    }
}

// ============================================================
// Backbones: feature extractors feeding the DeepLab heads
// ============================================================
// Every backbone returns the high-level map (2048 channels at the
// configured output stride) together with a stack of low-level
// maps pushed shallow → deep. Decoders `pop()` the stack, so the
// deepest skip is fused first.

pub mod resnet;
pub mod xception;

use burn::prelude::*;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use resnet::{ResNet, ResNetConfig};
use xception::{Xception, XceptionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackboneKind {
    #[default]
    #[value(name = "resnet101")]
    ResNet101,
    #[value(name = "xception")]
    Xception,
}

/// Output of one backbone forward pass.
pub struct BackboneFeatures<B: Backend> {
    pub out:       Tensor<B, 4>,
    /// Shallow first; consume with `pop()`.
    pub low_level: Vec<Tensor<B, 4>>,
}

#[derive(Config, Debug)]
pub struct BackboneConfig {
    pub kind: BackboneKind,
    #[config(default = 16)]
    pub output_stride: usize,
    /// Divides every channel count; 1 is the full-size network.
    #[config(default = 1)]
    pub width_divisor: usize,
    #[config(default = "[3, 4, 23, 3]")]
    pub resnet_blocks: [usize; 4],
    #[config(default = 16)]
    pub xception_middle_blocks: usize,
}

impl BackboneConfig {
    fn resnet(&self) -> ResNetConfig {
        ResNetConfig::new()
            .with_blocks(self.resnet_blocks)
            .with_output_stride(self.output_stride)
            .with_width_divisor(self.width_divisor)
    }

    fn xception(&self) -> XceptionConfig {
        XceptionConfig::new()
            .with_middle_blocks(self.xception_middle_blocks)
            .with_output_stride(self.output_stride)
            .with_width_divisor(self.width_divisor)
    }

    /// (high-level channels, low-level channels shallow → deep)
    pub fn channels(&self) -> (usize, [usize; 2]) {
        match self.kind {
            BackboneKind::ResNet101 => self.resnet().channels(),
            BackboneKind::Xception  => self.xception().channels(),
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Backbone<B> {
        match self.kind {
            BackboneKind::ResNet101 => Backbone {
                resnet:   Some(self.resnet().init(device)),
                xception: None,
            },
            BackboneKind::Xception => Backbone {
                resnet:   None,
                xception: Some(self.xception().init(device)),
            },
        }
    }
}

/// Exactly one of the fields is populated.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    resnet:   Option<ResNet<B>>,
    xception: Option<Xception<B>>,
}

impl<B: Backend> Backbone<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> BackboneFeatures<B> {
        match (&self.resnet, &self.xception) {
            (Some(net), _) => net.forward(x),
            (None, Some(net)) => net.forward(x),
            (None, None) => unreachable!("backbone built without a network"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_full_size_channels() {
        let resnet   = BackboneConfig::new(BackboneKind::ResNet101);
        let xception = BackboneConfig::new(BackboneKind::Xception);
        assert_eq!(resnet.channels(),   (2048, [256, 512]));
        assert_eq!(xception.channels(), (2048, [256, 728]));
    }

    #[test]
    fn test_dispatch_matches_kind() {
        let device = Default::default();
        let cfg = BackboneConfig::new(BackboneKind::Xception)
            .with_width_divisor(16)
            .with_xception_middle_blocks(1);
        let feats = cfg.init::<NdArray>(&device).forward(Tensor::zeros([1, 3, 32, 32], &device));

        let (high, low) = cfg.channels();
        assert_eq!(feats.out.dims()[1], high);
        assert_eq!(feats.low_level.len(), 2);
        assert_eq!(feats.low_level[1].dims()[1], low[1]);
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&BackboneKind::ResNet101).unwrap();
        assert_eq!(json, "\"resnet101\"");
        let kind: BackboneKind = serde_json::from_str("\"xception\"").unwrap();
        assert_eq!(kind, BackboneKind::Xception);
    }
}

use burn::{
    nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    prelude::*,
    tensor::activation::sigmoid,
};

use crate::ml::layers::{ConvBnRelu, ConvBnReluConfig};

// ─── Channel attention ────────────────────────────────────────────────────────
/// Squeeze-and-excitation style gate: one weight per channel, [N, C, 1, 1].
#[derive(Config, Debug)]
pub struct ChannelAttentionConfig {
    pub channels: usize,
    #[config(default = 4)]
    pub reduction: usize,
}

impl ChannelAttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ChannelAttention<B> {
        let hidden = (self.channels / self.reduction).max(1);
        ChannelAttention {
            pool:   AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: ConvBnReluConfig::new(self.channels, hidden).init(device),
            expand: ConvBnReluConfig::new(hidden, self.channels)
                .with_relu(false)
                .init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct ChannelAttention<B: Backend> {
    pool:   AdaptiveAvgPool2d,
    reduce: ConvBnRelu<B>,
    expand: ConvBnRelu<B>,
}

impl<B: Backend> ChannelAttention<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.reduce.forward(self.pool.forward(x));
        sigmoid(self.expand.forward(x))
    }
}

// ─── Spatial attention ────────────────────────────────────────────────────────
/// One weight per pixel, [N, 1, H, W], from the channel-wise max and mean.
#[derive(Config, Debug)]
pub struct SpatialAttentionConfig {
    #[config(default = 7)]
    pub kernel_size: usize,
}

impl SpatialAttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpatialAttention<B> {
        SpatialAttention {
            conv: ConvBnReluConfig::new(2, 1)
                .with_kernel_size(self.kernel_size)
                .with_relu(false)
                .init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct SpatialAttention<B: Backend> {
    conv: ConvBnRelu<B>,
}

impl<B: Backend> SpatialAttention<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        // max over the last axis: NdArray scatters max_dim grads only there
        let max  = x.clone().swap_dims(1, 3).max_dim(3).swap_dims(1, 3);
        let mean = x.mean_dim(1);
        sigmoid(self.conv.forward(Tensor::cat(vec![max, mean], 1)))
    }
}

// ─── Fusion block ─────────────────────────────────────────────────────────────
/// Fuses upsampled deep features `x` with a same-shape low-level map:
///
///   out = x + low
///   y   = out * channel_gate(x) + out * spatial_gate(low)
#[derive(Config, Debug)]
pub struct AttentionBlockConfig {
    pub channels: usize,
}

impl AttentionBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionBlock<B> {
        AttentionBlock {
            channel: ChannelAttentionConfig::new(self.channels).init(device),
            spatial: SpatialAttentionConfig::new().init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct AttentionBlock<B: Backend> {
    channel: ChannelAttention<B>,
    spatial: SpatialAttention<B>,
}

impl<B: Backend> AttentionBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, low: Tensor<B, 4>) -> Tensor<B, 4> {
        let dims = x.dims();
        let ca   = self.channel.forward(x.clone()).expand(dims);
        let sa   = self.spatial.forward(low.clone()).expand(dims);

        let out = x + low;
        out.clone() * ca + out * sa
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_gate_shapes_and_range() {
        let device = Default::default();
        let x = Tensor::<NdArray, 4>::random([2, 8, 4, 6], burn::tensor::Distribution::Default, &device);

        let ca = ChannelAttentionConfig::new(8).init(&device).forward(x.clone());
        let sa = SpatialAttentionConfig::new().init(&device).forward(x);
        assert_eq!(ca.dims(), [2, 8, 1, 1]);
        assert_eq!(sa.dims(), [2, 1, 4, 6]);

        let values: Vec<f32> = sa.into_data().iter::<f32>().collect();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_block_of_zeros_is_zero() {
        let device = Default::default();
        let block  = AttentionBlockConfig::new(4).init::<NdArray>(&device);
        let zeros  = Tensor::<NdArray, 4>::zeros([1, 4, 3, 3], &device);
        let out    = block.forward(zeros.clone(), zeros);

        assert_eq!(out.dims(), [1, 4, 3, 3]);
        let total: f32 = out.abs().sum().into_scalar();
        assert_eq!(total, 0.0);
    }

    #[test]
    fn test_spatial_gate_backward_on_cpu() {
        use burn::backend::Autodiff;
        type AD = Autodiff<NdArray>;

        let device = Default::default();
        let gate   = SpatialAttentionConfig::new().init::<AD>(&device);
        let x = Tensor::<AD, 4>::random([1, 4, 3, 3], burn::tensor::Distribution::Default, &device)
            .require_grad();

        let grads = gate.forward(x.clone()).sum().backward();
        let grad  = x.grad(&grads).unwrap();
        assert_eq!(grad.dims(), [1, 4, 3, 3]);
    }
}

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Conv -> BatchNorm -> (ReLU). Convolutions carry no bias since the
/// following BatchNorm has its own shift. Padding keeps the spatial
/// size for stride 1 ("same" padding, dilation aware).
#[derive(Config, Debug)]
pub struct ConvBnReluConfig {
    pub in_channels:  usize,
    pub out_channels: usize,
    #[config(default = 1)]
    pub kernel_size: usize,
    #[config(default = 1)]
    pub stride: usize,
    #[config(default = 1)]
    pub dilation: usize,
    #[config(default = 1)]
    pub groups: usize,
    #[config(default = true)]
    pub relu: bool,
}

impl ConvBnReluConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBnRelu<B> {
        let padding = self.dilation * (self.kernel_size - 1) / 2;
        let conv = Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_dilation([self.dilation, self.dilation])
        .with_groups(self.groups)
        .with_bias(false)
        .init(device);

        ConvBnRelu {
            conv,
            bn:   BatchNormConfig::new(self.out_channels).init(device),
            relu: self.relu.then(Relu::new),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn:   BatchNorm<B, 2>,
    pub relu: Option<Relu>,
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.bn.forward(self.conv.forward(x));
        match &self.relu {
            Some(relu) => relu.forward(x),
            None => x,
        }
    }
}

/// `[out, input]` weights of 1-D linear interpolation with corner
/// samples aligned. Every row sums to one.
fn linear_weights(out: usize, input: usize) -> Vec<f32> {
    let mut weights = vec![0.0f32; out * input];
    let scale = if out > 1 { (input - 1) as f32 / (out - 1) as f32 } else { 0.0 };
    for i in 0..out {
        let src  = i as f32 * scale;
        let lo   = (src.floor() as usize).min(input - 1);
        let hi   = (lo + 1).min(input - 1);
        let frac = src - lo as f32;
        weights[i * input + lo] += 1.0 - frac;
        weights[i * input + hi] += frac;
    }
    weights
}

/// Bilinear resize of an NCHW tensor to `[height, width]`, written as
/// `rows · x · colsᵀ` so it differentiates on every backend (NdArray
/// has no bilinear interpolate backward). No-op when the size matches.
pub fn resize_to<B: Backend>(x: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    let [n, c, h, w] = x.dims();
    if [h, w] == size {
        return x;
    }
    let [out_h, out_w] = size;
    let device = x.device();

    let rows = Tensor::<B, 2>::from_data(TensorData::new(linear_weights(out_h, h), [out_h, h]), &device);
    let cols = Tensor::<B, 2>::from_data(TensorData::new(linear_weights(out_w, w), [out_w, w]), &device)
        .transpose();

    let rows = rows.unsqueeze::<4>().expand([n, c, out_h, h]);
    let cols = cols.unsqueeze::<4>().expand([n, c, w, out_w]);
    rows.matmul(x.matmul(cols))
}

/// Spatial size of an NCHW tensor
pub fn spatial<B: Backend>(x: &Tensor<B, 4>) -> [usize; 2] {
    let [_, _, h, w] = x.dims();
    [h, w]
}

/// Channel count scaled down by `divisor` (never below one)
pub fn scaled(channels: usize, divisor: usize) -> usize {
    (channels / divisor.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_same_padding_keeps_size() {
        let device = Default::default();
        let block  = ConvBnReluConfig::new(3, 8)
            .with_kernel_size(3)
            .with_dilation(2)
            .init::<NdArray>(&device);
        let x = Tensor::<NdArray, 4>::zeros([1, 3, 9, 7], &device);
        assert_eq!(block.forward(x).dims(), [1, 8, 9, 7]);
    }

    #[test]
    fn test_stride_halves_size() {
        let device = Default::default();
        let block  = ConvBnReluConfig::new(4, 4)
            .with_kernel_size(3)
            .with_stride(2)
            .with_groups(4)
            .init::<NdArray>(&device);
        let x = Tensor::<NdArray, 4>::zeros([2, 4, 8, 8], &device);
        assert_eq!(block.forward(x).dims(), [2, 4, 4, 4]);
    }

    #[test]
    fn test_resize_and_scale_helpers() {
        let device = Default::default();
        let x = Tensor::<NdArray, 4>::ones([1, 2, 3, 3], &device);
        assert_eq!(spatial(&resize_to(x, [6, 5])), [6, 5]);
        assert_eq!(scaled(2048, 8), 256);
        assert_eq!(scaled(3, 8), 1);
    }

    #[test]
    fn test_resize_interpolates_between_corners() {
        let device = Default::default();
        let x = Tensor::<NdArray, 4>::from_data(TensorData::new(vec![0.0f32, 2.0], [1, 1, 1, 2]), &device);

        let wide: Vec<f32> = resize_to(x.clone(), [1, 3]).into_data().iter::<f32>().collect();
        assert_eq!(wide, vec![0.0, 1.0, 2.0]);

        // a 1x1 map is broadcast, as the ASPP pooling branch needs
        let pooled = Tensor::<NdArray, 4>::full([2, 3, 1, 1], 4.0, &device);
        let out: Vec<f32> = resize_to(pooled, [2, 5]).into_data().iter::<f32>().collect();
        assert_eq!(out.len(), 2 * 3 * 2 * 5);
        assert!(out.iter().all(|&v| (v - 4.0).abs() < 1e-6));
    }

    #[test]
    fn test_resize_backward_on_cpu() {
        use burn::backend::Autodiff;
        type AD = Autodiff<NdArray>;

        let device = Default::default();
        let x = Tensor::<AD, 4>::ones([1, 2, 3, 4], &device).require_grad();
        let grads = resize_to(x.clone(), [6, 8]).sum().backward();
        let grad: Vec<f32> = x.grad(&grads).unwrap().into_data().iter::<f32>().collect();

        // every output pixel spreads a total weight of one over the input
        let total: f32 = grad.iter().sum();
        assert!((total - 2.0 * 6.0 * 8.0).abs() < 1e-3);
    }
}

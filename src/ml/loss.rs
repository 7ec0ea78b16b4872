use burn::{prelude::*, tensor::activation::log_softmax};

/// Pixel-wise cross-entropy over logits [N, C, H, W] and trainId
/// targets [N, H, W]. Pixels equal to `ignore`, or naming a class
/// outside `0..C`, contribute nothing; the mean is over the remaining
/// pixels (0 when none remain).
pub fn segmentation_loss<B: Backend>(
    logits:  Tensor<B, 4>,
    targets: Tensor<B, 3, Int>,
    ignore:  u8,
) -> Tensor<B, 1> {
    let [_, classes, _, _] = logits.dims();

    // Classes on the last axis, [N, W, H, C]. The softmax max and the
    // gather then scatter their gradients along the final dimension,
    // the only one NdArray supports.
    let log_probs = log_softmax(logits.swap_dims(1, 3), 3);
    let targets   = targets.swap_dims(1, 2);

    let unknown = targets.clone().greater_equal_elem(classes as i64);
    let targets = targets.mask_fill(unknown, ignore as i64);
    let valid   = targets.clone().not_equal_elem(ignore as i64);
    let indices = targets.mask_fill(valid.clone().bool_not(), 0);

    // -log p(target) at every pixel, [N, W, H]
    let nll = log_probs
        .gather(3, indices.unsqueeze_dim::<4>(3))
        .squeeze::<3>(3)
        .neg();

    let weights = valid.float();
    let count   = weights.clone().sum().clamp_min(1.0);
    (nll * weights).sum() / count
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type B = NdArray;

    fn targets(values: Vec<i64>, device: &<B as Backend>::Device) -> Tensor<B, 3, Int> {
        Tensor::from_data(TensorData::new(values, [1, 2, 2]), device)
    }

    #[test]
    fn test_uniform_logits_give_log_num_classes() {
        let device = Default::default();
        let logits = Tensor::<B, 4>::zeros([1, 4, 2, 2], &device);
        let loss: f32 = segmentation_loss(logits, targets(vec![0, 1, 2, 3], &device), 255).into_scalar();
        assert!((loss - 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_ignored_pixels_are_excluded() {
        let device = Default::default();
        // Class 0 strongly favoured everywhere
        let mut values = vec![0.0f32; 2 * 4];
        values[..4].fill(10.0);
        let logits = Tensor::<B, 4>::from_data(TensorData::new(values, [1, 2, 2, 2]), &device);

        let correct: f32 = segmentation_loss(logits.clone(), targets(vec![0, 0, 255, 255], &device), 255)
            .into_scalar();
        let wrong: f32 = segmentation_loss(logits, targets(vec![0, 1, 255, 255], &device), 255)
            .into_scalar();
        assert!(correct < 1e-3);
        // one of two counted pixels is badly wrong (~10 nats)
        assert!((wrong - 5.0).abs() < 0.01);
    }

    #[test]
    fn test_class_ids_beyond_logits_are_ignored() {
        let device = Default::default();
        let logits = Tensor::<B, 4>::zeros([1, 5, 1, 2], &device);
        let target = Tensor::<B, 3, Int>::from_data(TensorData::new(vec![0i64, 13], [1, 1, 2]), &device);

        let loss: f32 = segmentation_loss(logits, target, 255).into_scalar();
        assert!((loss - 5f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_non_square_gradient_matches_shape() {
        let device = Default::default();
        let logits = Tensor::<Autodiff<B>, 4>::random([2, 3, 2, 5], burn::tensor::Distribution::Default, &device)
            .require_grad();
        let target = Tensor::<Autodiff<B>, 3, Int>::from_data(
            TensorData::new((0..20).map(|i| i % 3).collect::<Vec<i64>>(), [2, 2, 5]),
            &device,
        );

        let grads = segmentation_loss(logits.clone(), target, 255).backward();
        assert_eq!(logits.grad(&grads).unwrap().dims(), [2, 3, 2, 5]);
    }

    #[test]
    fn test_all_ignored_is_zero_and_differentiable() {
        let device = Default::default();
        let logits = Tensor::<Autodiff<B>, 4>::ones([1, 3, 2, 2], &device).require_grad();
        let target = Tensor::<Autodiff<B>, 3, Int>::full([1, 2, 2], 255, &device);

        let loss = segmentation_loss(logits.clone(), target, 255);
        let grads = loss.clone().backward();
        assert_eq!(loss.into_scalar(), 0.0);
        assert!(logits.grad(&grads).is_some());
    }
}

use serde::{Deserialize, Serialize};

use crate::domain::labels::class_name;

/// Outcome of one inference-only pass over an evaluation split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Mean cross-entropy over batches
    pub val_loss: f64,
    pub miou: f64,
    pub pixel_accuracy: f64,
    /// IoU per trainId; `None` when the class never appeared
    pub class_iou: Vec<Option<f64>>,
    /// Mean forward-pass latency per image, milliseconds
    pub inference_ms: f64,
    pub fps: f64,
    pub images: usize,
}

impl EvalReport {
    /// Derive the timing fields from the total inference time.
    pub fn timing(total_seconds: f64, images: usize) -> (f64, f64) {
        if images == 0 || total_seconds <= 0.0 {
            return (0.0, 0.0);
        }
        let per_image = total_seconds / images as f64;
        (per_image * 1000.0, images as f64 / total_seconds)
    }

    /// `(class name, IoU)` pairs in trainId order
    pub fn named_iou(&self) -> Vec<(String, Option<f64>)> {
        self.class_iou
            .iter()
            .enumerate()
            .map(|(id, iou)| (class_name(id), *iou))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing() {
        let (ms, fps) = EvalReport::timing(2.0, 50);
        assert!((ms - 40.0).abs() < 1e-9);
        assert!((fps - 25.0).abs() < 1e-9);
        assert_eq!(EvalReport::timing(0.0, 0), (0.0, 0.0));
    }

    #[test]
    fn test_named_iou_uses_class_table() {
        let report = EvalReport {
            val_loss:       0.0,
            miou:           0.5,
            pixel_accuracy: 0.5,
            class_iou:      vec![Some(1.0), None],
            inference_ms:   0.0,
            fps:            0.0,
            images:         1,
        };
        let named = report.named_iou();
        assert_eq!(named[0], ("road".to_string(), Some(1.0)));
        assert_eq!(named[1].0, "sidewalk");
    }
}

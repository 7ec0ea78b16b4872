// ============================================================
// Layer 3: Confusion Matrix / mIoU
// ============================================================
// Accumulates (target, prediction) pixel pairs over a whole
// evaluation pass. Row = ground truth class, column = predicted.
//
//   IoU(c) = TP / (TP + FP + FN)
//          = m[c][c] / (row_sum(c) + col_sum(c) - m[c][c])
//
// mIoU averages IoU over classes that occur at all (non-zero
// union), so classes absent from both the masks and the
// predictions do not drag the mean down.

#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    num_classes: usize,
    ignore:      i64,
    counts:      Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize, ignore: usize) -> Self {
        Self {
            num_classes,
            ignore: ignore as i64,
            counts: vec![0; num_classes * num_classes],
        }
    }

    /// Add a batch of flattened targets and predictions.
    /// Pixels whose target is the ignore value, or whose values fall
    /// outside `0..num_classes`, are skipped.
    pub fn update(&mut self, targets: &[i64], preds: &[i64]) {
        debug_assert_eq!(targets.len(), preds.len());
        let n = self.num_classes as i64;
        for (&t, &p) in targets.iter().zip(preds) {
            if t == self.ignore || t < 0 || t >= n || p < 0 || p >= n {
                continue;
            }
            self.counts[(t * n + p) as usize] += 1;
        }
    }

    fn at(&self, target: usize, pred: usize) -> u64 {
        self.counts[target * self.num_classes + pred]
    }

    /// Per-class IoU. `None` for classes with an empty union.
    pub fn class_iou(&self) -> Vec<Option<f64>> {
        (0..self.num_classes)
            .map(|c| {
                let tp        = self.at(c, c);
                let row: u64  = (0..self.num_classes).map(|p| self.at(c, p)).sum();
                let col: u64  = (0..self.num_classes).map(|t| self.at(t, c)).sum();
                let union     = row + col - tp;
                (union > 0).then(|| tp as f64 / union as f64)
            })
            .collect()
    }

    /// Mean IoU over classes present in targets or predictions.
    pub fn mean_iou(&self) -> f64 {
        let present: Vec<f64> = self.class_iou().into_iter().flatten().collect();
        if present.is_empty() {
            0.0
        } else {
            present.iter().sum::<f64>() / present.len() as f64
        }
    }

    /// Fraction of counted pixels predicted correctly
    pub fn pixel_accuracy(&self) -> f64 {
        let total: u64   = self.counts.iter().sum();
        let correct: u64 = (0..self.num_classes).map(|c| self.at(c, c)).sum();
        if total == 0 { 0.0 } else { correct as f64 / total as f64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction_gives_miou_one() {
        let mut cm = ConfusionMatrix::new(3, 255);
        cm.update(&[0, 1, 2, 2], &[0, 1, 2, 2]);
        assert!((cm.mean_iou() - 1.0).abs() < 1e-12);
        assert!((cm.pixel_accuracy() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_iou_counts_false_positives_and_negatives() {
        let mut cm = ConfusionMatrix::new(2, 255);
        // class 0: TP=1, FN=1 (target 0 predicted 1)
        // class 1: TP=1, FP=1
        cm.update(&[0, 0, 1], &[0, 1, 1]);
        let iou = cm.class_iou();
        assert_eq!(iou[0], Some(0.5));
        assert_eq!(iou[1], Some(0.5));
        assert!((cm.mean_iou() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ignore_pixels_are_skipped() {
        let mut cm = ConfusionMatrix::new(2, 255);
        cm.update(&[255, 255, 1], &[0, 0, 1]);
        assert_eq!(cm.class_iou()[0], None);
        assert!((cm.mean_iou() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_absent_classes_do_not_lower_the_mean() {
        let mut cm = ConfusionMatrix::new(19, 255);
        cm.update(&[3, 3], &[3, 3]);
        assert!((cm.mean_iou() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_matrix() {
        let cm = ConfusionMatrix::new(4, 255);
        assert_eq!(cm.mean_iou(), 0.0);
        assert_eq!(cm.pixel_accuracy(), 0.0);
    }
}

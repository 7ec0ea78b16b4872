// Learning-rate schedule driven by validation loss.
//
// Reduce-on-plateau, "min" mode with a relative threshold:
//   improvement  ⇔  metric < best · (1 − threshold)
//   after more than `patience` evaluations without improvement,
//   lr ← max(lr · factor, min_lr) and the counter resets.

#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    lr:         f64,
    factor:     f64,
    patience:   usize,
    threshold:  f64,
    min_lr:     f64,
    best:       f64,
    bad_epochs: usize,
}

impl PlateauScheduler {
    pub fn new(lr: f64, factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            lr,
            factor,
            patience,
            threshold:  1e-4,
            min_lr,
            best:       f64::INFINITY,
            bad_epochs: 0,
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Record one validation loss; returns the learning rate to use next.
    pub fn step(&mut self, metric: f64) -> f64 {
        if metric < self.best * (1.0 - self.threshold) {
            self.best       = metric;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs > self.patience {
            let reduced = (self.lr * self.factor).max(self.min_lr);
            if self.lr - reduced > 1e-8 {
                tracing::info!("Reducing learning rate {:.2e} -> {:.2e}", self.lr, reduced);
                self.lr = reduced;
            }
            self.bad_epochs = 0;
        }
        self.lr
    }
}

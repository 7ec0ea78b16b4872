// ============================================================
// Layer 6: Infrastructure Layer
// ============================================================
// Cross-cutting persistence used by training, evaluation and
// prediction alike:
//
//   checkpoint.rs  model weights through Burn's CompactRecorder,
//                    the best-mIoU record, and TrainConfig as JSON
//                    so evaluation can rebuild the architecture.
//
//   metrics.rs     per-epoch and per-step CSV logs, plus the
//                    timestamped evaluation report.

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

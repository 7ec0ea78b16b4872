// ============================================================
// Layer 2: Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training, evaluating or predicting).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow, plus TrainConfig
pub mod train_use_case;

// Best-checkpoint evaluation with CSV export
pub mod evaluate_use_case;

// Single-image segmentation
pub mod predict_use_case;

// ============================================================
// Layer 3: Domain Layer
// ============================================================
// Plain Rust structs and traits describing what the system works
// with: sample file pairs, the Cityscapes class table, and the
// confusion matrix behind mIoU.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Everything here is testable without a GPU or a dataset on disk.

// One (image, label) file pair
pub mod sample;

// Cityscapes labelId -> trainId table, class names, palette
pub mod labels;

// Pixel confusion matrix, per-class IoU and mIoU
pub mod confusion;

// Evaluation results (loss, IoU, timing)
pub mod report;

// Core abstractions (traits) that other layers implement
pub mod traits;

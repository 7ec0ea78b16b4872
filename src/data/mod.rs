// ============================================================
// Layer 4: Data Pipeline
// ============================================================
// Everything from files on disk to device-ready tensor batches:
//
//   Cityscapes tree
//       │
//       ▼
//   CityscapesLoader  → finds (image, label) pairs
//       │
//       ▼
//   SegDataset        → decodes lazily, applies transforms,
//       │               labelId → trainId (Burn Dataset trait)
//       ▼
//   SegBatcher        → stacks samples into tensors
//       │
//       ▼
//   DataLoader        → worker threads feed the loops
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Finds image/label pairs in a Cityscapes-style tree
pub mod loader;

/// Paired flip / random resized crop / resize / normalise
pub mod transforms;

/// Implements Burn's Dataset trait for segmentation samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

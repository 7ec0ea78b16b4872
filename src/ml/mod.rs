// ============================================================
// Layer 5: ML / Model Layer (Burn)
// ============================================================
// All network definitions and the loops that drive them.
//
//   layers.rs     shared Conv → BN → ReLU block, resize helpers
//   backbone/     ResNet101 and aligned Xception feature extractors
//   aspp.rs       atrous spatial pyramid pooling
//   attention.rs  channel / spatial attention gates
//   decoder.rs    concatenation and attention DeepLab decoders
//   deeplab.rs    Proposed and Attention-DeepLabv3+ assemblies
//   unet.rs       UNet
//   model.rs      SegmentationModel trait, ModelKind, builders
//
//   loss.rs       cross-entropy with an ignore label
//   scheduler.rs  reduce-on-plateau learning rate
//   trainer.rs    training loop and best-mIoU checkpointing
//   evaluator.rs  loss, IoU and timing over a loader
//   inferencer.rs single-image prediction
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Chen et al. (2018) DeepLabv3+
//            Ronneberger et al. (2015) U-Net

pub mod layers;
pub mod backbone;
pub mod aspp;
pub mod attention;
pub mod decoder;
pub mod deeplab;
pub mod unet;

/// Model trait, architecture selection and config builders
pub mod model;

/// wgpu / ndarray selection
pub mod backend;

pub mod loss;
pub mod scheduler;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Inference-only evaluation pass
pub mod evaluator;

/// Inference engine: loads a checkpoint and segments one image
pub mod inferencer;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Compute backend the generic training / evaluation code is
/// instantiated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU through wgpu (Vulkan / Metal / DX12)
    #[default]
    Wgpu,
    /// CPU
    #[value(name = "ndarray")]
    NdArray,
}

pub type GpuBackend = burn::backend::Wgpu;
pub type CpuBackend = burn::backend::NdArray;

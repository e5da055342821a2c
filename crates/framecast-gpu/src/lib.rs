//! Framecast GPU - wgpu compute backend
//!
//! Uses Metal on macOS and Vulkan/DX12 elsewhere (`WGPU_BACKEND` overrides).
//! One invocation packs one pixel pair; results are read back synchronously.

pub mod backend;
pub mod buffer_pool;
pub mod context;
pub mod kernels;

pub use backend::{GpuBackend, GpuMemoryInfo};
pub use buffer_pool::{BufferArena, BufferRole};
pub use context::GpuContext;
pub use kernels::{ConvertKernels, ConvertParams, Kernel};

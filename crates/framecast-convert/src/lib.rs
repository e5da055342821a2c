//! Framecast Convert - float RGBA to wire-format conversion
//!
//! Provides the CPU reference converter, the compute backend capability
//! trait with its CPU implementation, and the dispatcher that routes each
//! frame to the GPU when it is usable and to the CPU otherwise.

pub mod backend;
pub mod converter;
pub mod dispatcher;

pub use backend::{ComputeBackend, CpuBackend};
pub use converter::FormatConverter;
pub use dispatcher::{ConversionDispatcher, ConversionRequest, ConvertedBy, DispatchStats, GpuStatus};

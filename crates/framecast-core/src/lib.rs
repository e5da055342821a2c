//! Framecast Core - Foundation types for streaming rendered frames
//!
//! This crate provides the types shared by the conversion and streaming crates:
//! - Float RGBA frame views and owned queue copies
//! - Wire formats and encoded frame buffers
//! - Output color configuration and frame rates
//! - Per-stream configuration and the common error type

pub mod color;
pub mod config;
pub mod error;
pub mod frame;
pub mod time;

pub use color::{ColorConfig, ColorSpace, TransferFunction};
pub use config::{OutputConfig, OverflowPolicy};
pub use error::{FramecastError, Result};
pub use frame::{
    color_bars, solid_pixels, EncodedData, EncodedFrame, PendingFrame, RgbaFrame, WireFormat,
    RGBA_CHANNELS,
};
pub use time::FrameRate;

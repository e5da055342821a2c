//! Error types for Framecast.

use thiserror::Error;

/// Main error type for Framecast operations.
#[derive(Error, Debug)]
pub enum FramecastError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No usable compute device (missing hardware, driver rejection, kernel compile error).
    #[error("Compute backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A single conversion dispatch failed on the device.
    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    /// The caller handed over an empty buffer or a degenerate size.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Frame queue full ({depth} frames pending)")]
    QueueFull { depth: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Network sink error: {0}")]
    Sink(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FramecastError {
    /// Errors the dispatcher absorbs by converting on the CPU instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::ConversionFailed(_))
    }

    /// Errors that drop the frame they were raised for.
    pub fn is_frame_fatal(&self) -> bool {
        matches!(self, Self::InvalidFrame(_) | Self::QueueFull { .. })
    }
}

impl From<serde_json::Error> for FramecastError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for Framecast operations.
pub type Result<T> = std::result::Result<T, FramecastError>;

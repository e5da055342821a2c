//! Compute backend capability and the CPU reference backend.

use crate::converter::FormatConverter;
use framecast_color::pixel_math::YuvMatrix;
use framecast_core::{Result, RgbaFrame};

/// A device that can run the 4:2:2 conversions.
///
/// All methods take `&self`; implementations guard their device state with an
/// internal lock so one backend never has overlapping work in flight.
/// Output buffers are sized by the caller from [`framecast_core::WireFormat`].
pub trait ComputeBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Acquire the device and compile kernels.
    ///
    /// Fails with `BackendUnavailable`. Calling it on an initialized backend is a no-op.
    fn init(&self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// 8-bit packed 4:2:2 (U Y0 V Y1), Rec. 709. Fails with `ConversionFailed`.
    fn convert_packed8_422(&self, frame: &RgbaFrame<'_>, out: &mut [u8]) -> Result<()>;

    /// 16-bit planar 4:2:2 limited range. Fails with `ConversionFailed`.
    fn convert_planar16_422(
        &self,
        frame: &RgbaFrame<'_>,
        matrix: YuvMatrix,
        out: &mut [u16],
    ) -> Result<()>;

    /// Release device resources. Idempotent.
    fn shutdown(&self);
}

/// Reference backend running [`FormatConverter`] on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend {
    converter: FormatConverter,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallel(parallel: bool) -> Self {
        Self {
            converter: FormatConverter::with_parallel(parallel),
        }
    }

    pub fn converter(&self) -> &FormatConverter {
        &self.converter
    }

    /// 8-bit RGBA. Only the CPU produces this layout.
    pub fn convert_packed8_444(&self, frame: &RgbaFrame<'_>, out: &mut [u8]) -> Result<()> {
        self.converter.packed8_444_into(frame, out)
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn convert_packed8_422(&self, frame: &RgbaFrame<'_>, out: &mut [u8]) -> Result<()> {
        self.converter.packed8_422_into(frame, out)
    }

    fn convert_planar16_422(
        &self,
        frame: &RgbaFrame<'_>,
        matrix: YuvMatrix,
        out: &mut [u16],
    ) -> Result<()> {
        self.converter.planar16_422_into(frame, matrix, out)
    }

    fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_core::{solid_pixels, WireFormat};

    #[test]
    fn cpu_backend_matches_converter() {
        let pixels = solid_pixels(10, 6, [0.2, 0.4, 0.6, 1.0]);
        let frame = RgbaFrame::new(&pixels, 10, 6).unwrap();
        let backend = CpuBackend::new();
        backend.init().unwrap();
        assert!(backend.is_initialized());

        let mut out = vec![0u8; WireFormat::Uyvy.sample_count(10, 6)];
        backend.convert_packed8_422(&frame, &mut out).unwrap();
        assert_eq!(out, FormatConverter::new().to_packed8_422(&frame));

        let mut words = vec![0u16; WireFormat::P216.sample_count(10, 6)];
        backend
            .convert_planar16_422(&frame, YuvMatrix::Rec2020, &mut words)
            .unwrap();
        assert_eq!(words, FormatConverter::new().to_planar16_422(&frame, YuvMatrix::Rec2020));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let backend = CpuBackend::new();
        backend.shutdown();
        backend.shutdown();
        assert!(backend.is_initialized());
    }
}

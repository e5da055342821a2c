//! Per-frame routing between the GPU backend and the CPU reference.
//!
//! GPU initialization happens lazily on the first frame that wants it. A
//! failed initialization latches the GPU off until [`ConversionDispatcher::retry_gpu_init`];
//! a failed conversion only costs that frame a CPU fallback.

use crate::backend::{ComputeBackend, CpuBackend};
use framecast_color::pixel_math::YuvMatrix;
use framecast_core::{EncodedFrame, OutputConfig, Result, RgbaFrame, WireFormat};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Target layout and matrix for one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionRequest {
    pub format: WireFormat,
    pub matrix: YuvMatrix,
}

impl ConversionRequest {
    pub const UYVY: Self = Self {
        format: WireFormat::Uyvy,
        matrix: YuvMatrix::Rec709,
    };

    pub const RGBA: Self = Self {
        format: WireFormat::Rgba,
        matrix: YuvMatrix::Rec709,
    };

    pub const fn p216(matrix: YuvMatrix) -> Self {
        Self {
            format: WireFormat::P216,
            matrix,
        }
    }

    /// Layout and matrix selected by the output settings.
    pub fn for_output(config: &OutputConfig) -> Self {
        match config.wire_format() {
            WireFormat::P216 => Self::p216(YuvMatrix::for_color_space(config.color_space)),
            WireFormat::Uyvy => Self::UYVY,
            WireFormat::Rgba => Self::RGBA,
        }
    }
}

/// Where a frame was converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertedBy {
    Gpu,
    Cpu,
}

/// GPU availability as seen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuStatus {
    /// No GPU backend attached.
    Absent,
    /// Not initialized yet; the next GPU-eligible frame will try.
    Uninitialized,
    Ready,
    /// Initialization failed; CPU only until a retry.
    Unavailable,
}

/// Snapshot of dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub gpu_conversions: u64,
    pub cpu_conversions: u64,
    pub gpu_fallbacks: u64,
    pub gpu_init_failures: u64,
}

#[derive(Default)]
struct Counters {
    gpu_conversions: AtomicU64,
    cpu_conversions: AtomicU64,
    gpu_fallbacks: AtomicU64,
    gpu_init_failures: AtomicU64,
}

/// Routes conversions to the GPU when preferred and usable, otherwise to the CPU.
pub struct ConversionDispatcher {
    cpu: CpuBackend,
    gpu: Option<Arc<dyn ComputeBackend>>,
    prefer_gpu: AtomicBool,
    gpu_status: Mutex<GpuStatus>,
    counters: Counters,
}

impl ConversionDispatcher {
    /// CPU-only dispatcher.
    pub fn cpu_only(cpu: CpuBackend) -> Self {
        Self {
            cpu,
            gpu: None,
            prefer_gpu: AtomicBool::new(false),
            gpu_status: Mutex::new(GpuStatus::Absent),
            counters: Counters::default(),
        }
    }

    /// Dispatcher with a GPU backend. The backend is initialized on first use.
    pub fn with_gpu(cpu: CpuBackend, gpu: Arc<dyn ComputeBackend>, prefer_gpu: bool) -> Self {
        Self {
            cpu,
            gpu: Some(gpu),
            prefer_gpu: AtomicBool::new(prefer_gpu),
            gpu_status: Mutex::new(GpuStatus::Uninitialized),
            counters: Counters::default(),
        }
    }

    pub fn set_prefer_gpu(&self, prefer: bool) {
        self.prefer_gpu.store(prefer, Ordering::Relaxed);
    }

    pub fn prefers_gpu(&self) -> bool {
        self.prefer_gpu.load(Ordering::Relaxed)
    }

    pub fn gpu_status(&self) -> GpuStatus {
        *self.gpu_status.lock()
    }

    pub fn cpu(&self) -> &CpuBackend {
        &self.cpu
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            gpu_conversions: self.counters.gpu_conversions.load(Ordering::Relaxed),
            cpu_conversions: self.counters.cpu_conversions.load(Ordering::Relaxed),
            gpu_fallbacks: self.counters.gpu_fallbacks.load(Ordering::Relaxed),
            gpu_init_failures: self.counters.gpu_init_failures.load(Ordering::Relaxed),
        }
    }

    /// Clear a latched initialization failure and initialize the GPU now.
    pub fn retry_gpu_init(&self) -> Result<()> {
        let Some(gpu) = &self.gpu else {
            return Ok(());
        };
        let mut status = self.gpu_status.lock();
        *status = GpuStatus::Uninitialized;
        self.init_locked(gpu.as_ref(), &mut status)
    }

    /// Convert into a fresh [`EncodedFrame`].
    pub fn convert(&self, frame: &RgbaFrame<'_>, request: ConversionRequest) -> Result<EncodedFrame> {
        let mut out = EncodedFrame::empty(request.format);
        self.convert_into(frame, request, &mut out)?;
        Ok(out)
    }

    /// Convert into `out`, reusing its buffer.
    ///
    /// GPU errors never escape: they are logged and the CPU converts the frame.
    pub fn convert_into(
        &self,
        frame: &RgbaFrame<'_>,
        request: ConversionRequest,
        out: &mut EncodedFrame,
    ) -> Result<ConvertedBy> {
        let (width, height) = (frame.width(), frame.height());
        let by = match request.format {
            WireFormat::Rgba => {
                let buf = out.prepare_bytes(WireFormat::Rgba, width, height);
                self.cpu.convert_packed8_444(frame, buf)?;
                ConvertedBy::Cpu
            }
            WireFormat::Uyvy => {
                let buf = out.prepare_bytes(WireFormat::Uyvy, width, height);
                if self.try_gpu(request, |gpu| gpu.convert_packed8_422(frame, buf)) {
                    ConvertedBy::Gpu
                } else {
                    self.cpu.convert_packed8_422(frame, buf)?;
                    ConvertedBy::Cpu
                }
            }
            WireFormat::P216 => {
                let buf = out.prepare_words(width, height);
                if self.try_gpu(request, |gpu| {
                    gpu.convert_planar16_422(frame, request.matrix, buf)
                }) {
                    ConvertedBy::Gpu
                } else {
                    self.cpu.convert_planar16_422(frame, request.matrix, buf)?;
                    ConvertedBy::Cpu
                }
            }
        };

        match by {
            ConvertedBy::Gpu => self.counters.gpu_conversions.fetch_add(1, Ordering::Relaxed),
            ConvertedBy::Cpu => self.counters.cpu_conversions.fetch_add(1, Ordering::Relaxed),
        };
        debug!(
            width,
            height,
            format = request.format.fourcc_str(),
            backend = ?by,
            "frame converted"
        );
        Ok(by)
    }

    /// Release the GPU backend. The next GPU-eligible frame initializes it again.
    pub fn shutdown(&self) {
        if let Some(gpu) = &self.gpu {
            gpu.shutdown();
            *self.gpu_status.lock() = GpuStatus::Uninitialized;
            info!(backend = gpu.name(), "compute backend shut down");
        }
    }

    /// Run `attempt` on the GPU if it is usable. False means the CPU must convert.
    fn try_gpu(
        &self,
        request: ConversionRequest,
        attempt: impl FnOnce(&dyn ComputeBackend) -> Result<()>,
    ) -> bool {
        let Some(gpu) = self.ready_gpu() else {
            return false;
        };
        match attempt(gpu) {
            Ok(()) => true,
            Err(e) => {
                self.counters.gpu_fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    backend = gpu.name(),
                    format = request.format.fourcc_str(),
                    error = %e,
                    "GPU conversion failed, falling back to CPU"
                );
                false
            }
        }
    }

    fn ready_gpu(&self) -> Option<&dyn ComputeBackend> {
        if !self.prefers_gpu() {
            return None;
        }
        let gpu = self.gpu.as_deref()?;
        let mut status = self.gpu_status.lock();
        match *status {
            GpuStatus::Ready => Some(gpu),
            GpuStatus::Uninitialized => self.init_locked(gpu, &mut status).ok().map(|()| gpu),
            GpuStatus::Unavailable | GpuStatus::Absent => None,
        }
    }

    fn init_locked(&self, gpu: &dyn ComputeBackend, status: &mut GpuStatus) -> Result<()> {
        match gpu.init() {
            Ok(()) => {
                *status = GpuStatus::Ready;
                info!(backend = gpu.name(), "compute backend initialized");
                Ok(())
            }
            Err(e) => {
                *status = GpuStatus::Unavailable;
                self.counters.gpu_init_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    backend = gpu.name(),
                    error = %e,
                    "compute backend unavailable, using CPU until re-initialized"
                );
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ConversionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionDispatcher")
            .field("gpu", &self.gpu.as_ref().map(|g| g.name().to_string()))
            .field("prefer_gpu", &self.prefers_gpu())
            .field("gpu_status", &self.gpu_status())
            .finish()
    }
}

//! wgpu implementation of [`ComputeBackend`].
//!
//! Each call uploads the frame into the arena's input buffer, dispatches the
//! packer, copies the outputs into a mappable buffer and blocks until the map
//! completes or the timeout expires.

use crate::buffer_pool::{BufferArena, BufferRole};
use crate::context::GpuContext;
use crate::kernels::{workgroup_counts, ConvertKernels, ConvertParams, Kernel};
use crossbeam_channel::RecvTimeoutError;
use framecast_color::pixel_math::YuvMatrix;
use framecast_convert::ComputeBackend;
use framecast_core::{FramecastError, Result, RgbaFrame, WireFormat};
use parking_lot::Mutex;
use std::num::NonZeroU64;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default wait for device completion.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Advisory memory figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMemoryInfo {
    /// Bytes currently held by the buffer arena.
    pub arena_bytes: u64,
    /// Largest single buffer the device accepts.
    pub max_buffer_size: u64,
}

/// Device, kernels and buffers of one initialized backend.
struct ComputeContext {
    gpu: GpuContext,
    kernels: ConvertKernels,
    arena: BufferArena,
}

/// GPU compute backend. All device work is serialized by one lock.
pub struct GpuBackend {
    context: Mutex<Option<ComputeContext>>,
    timeout: Duration,
}

impl Default for GpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            context: Mutex::new(None),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a GPU adapter is present on this machine.
    pub fn is_available() -> bool {
        GpuContext::probe()
    }

    /// Adapter name, once initialized.
    pub fn device_name(&self) -> Option<String> {
        self.context.lock().as_ref().map(|c| c.gpu.device_name())
    }

    /// Arena usage and device buffer limit, once initialized.
    pub fn memory_info(&self) -> Option<GpuMemoryInfo> {
        self.context.lock().as_ref().map(|c| GpuMemoryInfo {
            arena_bytes: c.arena.allocated_bytes(),
            max_buffer_size: c.gpu.max_buffer_size(),
        })
    }

    fn run(
        &self,
        kernel: Kernel,
        frame: &RgbaFrame<'_>,
        matrix: YuvMatrix,
        out: &mut [u8],
    ) -> Result<()> {
        let mut guard = self.context.lock();
        let ctx = guard.as_mut().ok_or_else(|| {
            FramecastError::ConversionFailed("GPU backend not initialized".to_string())
        })?;
        ctx.run(kernel, frame, matrix, self.timeout, out)
    }
}

fn check_len(format: WireFormat, frame: &RgbaFrame<'_>, bytes: usize) -> Result<()> {
    let needed = format.byte_size(frame.width(), frame.height());
    if bytes != needed {
        return Err(FramecastError::ConversionFailed(format!(
            "{} output holds {} bytes, needs {}",
            format.fourcc_str(),
            bytes,
            needed
        )));
    }
    Ok(())
}

fn scope_error(device: &wgpu::Device) -> Option<wgpu::Error> {
    // Scopes pop in reverse push order: validation, then out-of-memory.
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());
    validation.or(oom)
}

fn push_scopes(device: &wgpu::Device) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
}

fn binding(buffer: &wgpu::Buffer, bytes: u64) -> wgpu::BindingResource<'_> {
    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
        buffer,
        offset: 0,
        size: NonZeroU64::new(bytes),
    })
}

impl ComputeContext {
    fn new() -> Result<Self> {
        let gpu = GpuContext::new_blocking()?;

        push_scopes(&gpu.device);
        let kernels = ConvertKernels::new(&gpu.device);
        if let Some(e) = scope_error(&gpu.device) {
            return Err(FramecastError::BackendUnavailable(format!(
                "kernel compilation failed: {}",
                e
            )));
        }

        Ok(Self {
            gpu,
            kernels,
            arena: BufferArena::new(),
        })
    }

    fn run(
        &mut self,
        kernel: Kernel,
        frame: &RgbaFrame<'_>,
        matrix: YuvMatrix,
        timeout: Duration,
        out: &mut [u8],
    ) -> Result<()> {
        let started = Instant::now();
        let (width, height) = (frame.width(), frame.height());
        let input_bytes = std::mem::size_of_val(frame.pixels()) as u64;
        let plane_bytes = WireFormat::pairs_per_row(width) as u64 * height as u64 * 4;
        let readback_bytes = plane_bytes * kernel.output_count() as u64;
        let params_bytes = std::mem::size_of::<ConvertParams>() as u64;

        if input_bytes > self.gpu.max_storage_binding() {
            return Err(FramecastError::ConversionFailed(format!(
                "{}x{} frame exceeds the device storage binding limit",
                width, height
            )));
        }

        let device = self.gpu.device.clone();
        let queue = self.gpu.queue.clone();
        let outputs: &[BufferRole] = match kernel {
            Kernel::PackUyvy => &[BufferRole::Packed],
            Kernel::PackP216 => &[BufferRole::LumaPlane, BufferRole::ChromaPlane],
        };

        push_scopes(&device);
        self.arena.ensure_capacity(&device, BufferRole::Input, input_bytes);
        self.arena.ensure_capacity(&device, BufferRole::Params, params_bytes);
        for &role in outputs {
            self.arena.ensure_capacity(&device, role, plane_bytes);
        }
        self.arena.ensure_capacity(&device, BufferRole::Readback, readback_bytes);
        if let Some(e) = scope_error(&device) {
            self.arena.clear();
            return Err(FramecastError::ConversionFailed(format!(
                "buffer allocation failed: {}",
                e
            )));
        }

        let input = self.arena.buffer(BufferRole::Input)?;
        let params = self.arena.buffer(BufferRole::Params)?;
        let readback = self.arena.buffer(BufferRole::Readback)?;
        let output_buffers = outputs
            .iter()
            .map(|&role| self.arena.buffer(role))
            .collect::<Result<Vec<_>>>()?;
        let pipeline = self.kernels.get(kernel);

        push_scopes(&device);
        queue.write_buffer(input, 0, bytemuck::cast_slice(frame.pixels()));
        queue.write_buffer(
            params,
            0,
            bytemuck::bytes_of(&ConvertParams::new(width, height, matrix)),
        );

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: binding(params, params_bytes),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: binding(input, input_bytes),
            },
        ];
        for (i, &buffer) in output_buffers.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + i as u32,
                resource: binding(buffer, plane_bytes),
            });
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.entry_point()),
            layout: &pipeline.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("framecast_convert_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let (groups_x, groups_y) = workgroup_counts(width, height);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        for (i, &buffer) in output_buffers.iter().enumerate() {
            encoder.copy_buffer_to_buffer(buffer, 0, readback, i as u64 * plane_bytes, plane_bytes);
        }
        queue.submit(Some(encoder.finish()));

        if let Some(e) = scope_error(&device) {
            return Err(FramecastError::ConversionFailed(format!(
                "{} dispatch failed: {}",
                kernel.entry_point(),
                e
            )));
        }

        let slice = readback.slice(..readback_bytes);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let deadline = started + timeout;
        let mapped = loop {
            let _ = device.poll(wgpu::Maintain::Poll);
            match rx.recv_timeout(Duration::from_millis(1)) {
                Ok(result) => break Some(result),
                Err(RecvTimeoutError::Timeout) if Instant::now() < deadline => continue,
                Err(RecvTimeoutError::Timeout) => break None,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FramecastError::ConversionFailed(
                        "readback callback dropped".to_string(),
                    ))
                }
            }
        };

        match mapped {
            Some(Ok(())) => {
                {
                    let data = slice.get_mapped_range();
                    out.copy_from_slice(&data[..out.len()]);
                }
                readback.unmap();
                debug!(
                    width,
                    height,
                    kernel = kernel.entry_point(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "GPU conversion complete"
                );
                Ok(())
            }
            Some(Err(e)) => Err(FramecastError::ConversionFailed(format!(
                "readback mapping failed: {}",
                e
            ))),
            None => {
                // The pending map keeps the old buffer busy; start over with a fresh one.
                self.arena.discard(BufferRole::Readback);
                Err(FramecastError::ConversionFailed(format!(
                    "device did not finish within {:?}",
                    timeout
                )))
            }
        }
    }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn init(&self) -> Result<()> {
        let mut guard = self.context.lock();
        if guard.is_some() {
            return Ok(());
        }
        let ctx = ComputeContext::new()?;
        info!(device = %ctx.gpu.device_name(), "GPU compute backend ready");
        *guard = Some(ctx);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.context.lock().is_some()
    }

    fn convert_packed8_422(&self, frame: &RgbaFrame<'_>, out: &mut [u8]) -> Result<()> {
        check_len(WireFormat::Uyvy, frame, out.len())?;
        self.run(Kernel::PackUyvy, frame, YuvMatrix::Rec709, out)
    }

    fn convert_planar16_422(
        &self,
        frame: &RgbaFrame<'_>,
        matrix: YuvMatrix,
        out: &mut [u16],
    ) -> Result<()> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        check_len(WireFormat::P216, frame, bytes.len())?;
        self.run(Kernel::PackP216, frame, matrix, bytes)
    }

    fn shutdown(&self) {
        if let Some(mut ctx) = self.context.lock().take() {
            ctx.arena.clear();
            let _ = ctx.gpu.device.poll(wgpu::Maintain::Wait);
            info!(device = %ctx.gpu.device_name(), "GPU compute backend released");
        } else {
            debug!("GPU compute backend already released");
        }
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        if self.context.get_mut().is_some() {
            self.shutdown();
        }
    }
}

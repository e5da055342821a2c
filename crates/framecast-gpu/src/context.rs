//! GPU context management.

use framecast_core::{FramecastError, Result};
use std::sync::Arc;
use tracing::info;

/// Largest single buffer requested from the device.
const MAX_BUFFER_SIZE: u64 = 512 * 1024 * 1024;
/// Largest storage binding requested from the device (a 4K float RGBA frame fits).
const MAX_STORAGE_BINDING: u32 = 256 * 1024 * 1024;

/// GPU context holding device and queue.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

/// Backends to try: Metal on macOS, Vulkan or DX12 elsewhere, unless `WGPU_BACKEND` says otherwise.
fn preferred_backends() -> wgpu::Backends {
    #[cfg(target_os = "macos")]
    let default = wgpu::Backends::METAL;
    #[cfg(not(target_os = "macos"))]
    let default = wgpu::Backends::VULKAN | wgpu::Backends::DX12;

    wgpu::util::backend_bits_from_env().unwrap_or(default)
}

async fn request_adapter(instance: &wgpu::Instance) -> Option<wgpu::Adapter> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
}

fn new_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: preferred_backends(),
        ..Default::default()
    })
}

impl GpuContext {
    /// Create a new GPU context for compute work.
    ///
    /// Fails with `BackendUnavailable` when no adapter or device can be acquired.
    pub async fn new() -> Result<Self> {
        let instance = new_instance();

        let adapter = request_adapter(&instance).await.ok_or_else(|| {
            FramecastError::BackendUnavailable("no suitable GPU adapter found".to_string())
        })?;

        info!("Using GPU adapter: {:?}", adapter.get_info());

        let supported = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Framecast Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_buffer_size: MAX_BUFFER_SIZE.min(supported.max_buffer_size),
                        max_storage_buffer_binding_size: MAX_STORAGE_BINDING
                            .min(supported.max_storage_buffer_binding_size),
                        ..wgpu::Limits::default()
                    },
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| {
                FramecastError::BackendUnavailable(format!("failed to create device: {}", e))
            })?;

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Create a new GPU context (blocking version).
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    /// Whether any suitable adapter is present, without creating a device.
    pub fn probe() -> bool {
        let instance = new_instance();
        pollster::block_on(request_adapter(&instance)).is_some()
    }

    /// Get adapter info.
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Adapter name and backend, e.g. `"Apple M1 (Metal)"`.
    pub fn device_name(&self) -> String {
        let info = self.adapter_info();
        format!("{} ({:?})", info.name, info.backend)
    }

    /// Largest buffer the device accepts.
    pub fn max_buffer_size(&self) -> u64 {
        self.device.limits().max_buffer_size
    }

    /// Largest storage binding the device accepts.
    pub fn max_storage_binding(&self) -> u64 {
        self.device.limits().max_storage_buffer_binding_size as u64
    }
}

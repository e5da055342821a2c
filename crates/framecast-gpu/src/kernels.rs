//! Compute pipelines for the 4:2:2 packers.

use bytemuck::{Pod, Zeroable};
use framecast_color::pixel_math::YuvMatrix;
use framecast_core::WireFormat;

/// Workgroup edge, matching `@workgroup_size(16, 16)` in the shader.
pub const WORKGROUP_SIZE: u32 = 16;

const SHADER_SOURCE: &str = include_str!("shaders/convert.wgsl");

/// Uniforms shared by both kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ConvertParams {
    pub width: u32,
    pub height: u32,
    pub pairs_per_row: u32,
    pub _pad: u32,
    pub luma: [f32; 4],
    pub chroma_u: [f32; 4],
    pub chroma_v: [f32; 4],
}

impl ConvertParams {
    pub fn new(width: u32, height: u32, matrix: YuvMatrix) -> Self {
        let c = matrix.coefficients();
        Self {
            width,
            height,
            pairs_per_row: WireFormat::pairs_per_row(width),
            _pad: 0,
            luma: c.luma.extend(0.0).to_array(),
            chroma_u: c.chroma_u.extend(0.0).to_array(),
            chroma_v: c.chroma_v.extend(0.0).to_array(),
        }
    }
}

/// Which packer to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    PackUyvy,
    PackP216,
}

impl Kernel {
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::PackUyvy => "pack_uyvy",
            Self::PackP216 => "pack_p216",
        }
    }

    /// Number of storage outputs bound after the input.
    pub fn output_count(self) -> u32 {
        match self {
            Self::PackUyvy => 1,
            Self::PackP216 => 2,
        }
    }
}

/// Workgroups needed to cover a frame: one invocation per pixel pair.
pub fn workgroup_counts(width: u32, height: u32) -> (u32, u32) {
    (
        WireFormat::pairs_per_row(width).div_ceil(WORKGROUP_SIZE),
        height.div_ceil(WORKGROUP_SIZE),
    )
}

pub struct KernelPipeline {
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

/// Both packers compiled from one shader module.
pub struct ConvertKernels {
    uyvy: KernelPipeline,
    p216: KernelPipeline,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_pipeline(device: &wgpu::Device, module: &wgpu::ShaderModule, kernel: Kernel) -> KernelPipeline {
    let mut entries = vec![
        // params: uniform buffer
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<ConvertParams>() as u64),
            },
            count: None,
        },
        // src: float RGBA pixels
        storage_entry(1, true),
    ];
    for i in 0..kernel.output_count() {
        entries.push(storage_entry(2 + i, false));
    }

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(kernel.entry_point()),
        entries: &entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(kernel.entry_point()),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(kernel.entry_point()),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(kernel.entry_point()),
        compilation_options: Default::default(),
        cache: None,
    });

    KernelPipeline {
        pipeline,
        bind_group_layout,
    }
}

impl ConvertKernels {
    /// Compile both kernels. Compilation errors surface through the device's error scopes.
    pub fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("framecast_convert"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        Self {
            uyvy: create_pipeline(device, &module, Kernel::PackUyvy),
            p216: create_pipeline(device, &module, Kernel::PackP216),
        }
    }

    pub fn get(&self, kernel: Kernel) -> &KernelPipeline {
        match kernel {
            Kernel::PackUyvy => &self.uyvy,
            Kernel::PackP216 => &self.p216,
        }
    }
}

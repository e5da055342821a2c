//! Integration tests for the GPU backend.
//!
//! Every test returns early when the machine has no usable adapter.

use framecast_color::YuvMatrix;
use framecast_convert::{
    ComputeBackend, ConversionDispatcher, ConversionRequest, ConvertedBy, CpuBackend, GpuStatus,
};
use framecast_core::{color_bars, EncodedFrame, RgbaFrame, WireFormat};
use framecast_gpu::GpuBackend;
use std::sync::Arc;

fn ready_backend() -> Option<GpuBackend> {
    if !GpuBackend::is_available() {
        eprintln!("no GPU adapter, skipping");
        return None;
    }
    let gpu = GpuBackend::new();
    match gpu.init() {
        Ok(()) => Some(gpu),
        Err(e) => {
            eprintln!("GPU init failed ({}), skipping", e);
            None
        }
    }
}

fn gradient(width: u32, height: u32) -> Vec<f32> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let fx = x as f32 / width as f32;
            let fy = y as f32 / height as f32;
            // Step past 1.0 near the edge to exercise clamping.
            pixels.extend_from_slice(&[fx * 1.2, fy, 1.0 - fx, 1.0]);
        }
    }
    pixels
}

#[test]
fn uyvy_matches_cpu_within_one_step() {
    let Some(gpu) = ready_backend() else { return };
    let (w, h) = (1920, 1080);
    let pixels = color_bars(w, h);
    let frame = RgbaFrame::new(&pixels, w, h).unwrap();

    let expected = CpuBackend::new().converter().to_packed8_422(&frame);
    let mut actual = vec![0u8; expected.len()];
    gpu.convert_packed8_422(&frame, &mut actual).unwrap();

    let worst = expected
        .iter()
        .zip(&actual)
        .map(|(a, b)| a.abs_diff(*b))
        .max()
        .unwrap_or(0);
    assert!(worst <= 1, "largest UYVY difference {}", worst);
}

#[test]
fn p216_matches_cpu_within_one_step() {
    let Some(gpu) = ready_backend() else { return };
    // Odd width exercises the duplicated last column.
    let (w, h) = (641, 37);
    let pixels = gradient(w, h);
    let frame = RgbaFrame::new(&pixels, w, h).unwrap();

    for matrix in [YuvMatrix::Rec709, YuvMatrix::Rec2020] {
        let expected = CpuBackend::new().converter().to_planar16_422(&frame, matrix);
        let mut actual = vec![0u16; expected.len()];
        gpu.convert_planar16_422(&frame, matrix, &mut actual).unwrap();

        let worst = expected
            .iter()
            .zip(&actual)
            .map(|(a, b)| a.abs_diff(*b))
            .max()
            .unwrap_or(0);
        assert!(worst <= 1, "{:?}: largest P216 difference {}", matrix, worst);
    }
}

#[test]
fn arena_grows_and_is_reused() {
    let Some(gpu) = ready_backend() else { return };
    let small = color_bars(64, 64);
    let large = color_bars(256, 128);

    let mut out = vec![0u8; WireFormat::Uyvy.byte_size(256, 128)];
    gpu.convert_packed8_422(&RgbaFrame::new(&large, 256, 128).unwrap(), &mut out)
        .unwrap();
    let after_large = gpu.memory_info().unwrap().arena_bytes;

    let mut out = vec![0u8; WireFormat::Uyvy.byte_size(64, 64)];
    gpu.convert_packed8_422(&RgbaFrame::new(&small, 64, 64).unwrap(), &mut out)
        .unwrap();
    assert_eq!(gpu.memory_info().unwrap().arena_bytes, after_large);

    gpu.shutdown();
    assert!(!gpu.is_initialized());
    assert!(gpu.memory_info().is_none());
}

#[test]
fn dispatcher_prefers_gpu_when_ready() {
    if ready_backend().is_none() {
        return;
    }
    let dispatcher =
        ConversionDispatcher::with_gpu(CpuBackend::new(), Arc::new(GpuBackend::new()), true);
    let pixels = color_bars(320, 180);
    let frame = RgbaFrame::new(&pixels, 320, 180).unwrap();
    let mut out = EncodedFrame::empty(WireFormat::Uyvy);

    let by = dispatcher
        .convert_into(&frame, ConversionRequest::UYVY, &mut out)
        .unwrap();
    assert_eq!(by, ConvertedBy::Gpu);
    assert_eq!(dispatcher.gpu_status(), GpuStatus::Ready);

    // RGBA never leaves the CPU.
    let by = dispatcher
        .convert_into(&frame, ConversionRequest::RGBA, &mut out)
        .unwrap();
    assert_eq!(by, ConvertedBy::Cpu);

    dispatcher.shutdown();
    assert_eq!(dispatcher.gpu_status(), GpuStatus::Uninitialized);
}

//! End-to-end scenarios through `OutputStream`.

use framecast_color::YuvMatrix;
use framecast_convert::{ComputeBackend, ConversionDispatcher, CpuBackend, GpuStatus};
use framecast_core::{
    solid_pixels, ColorSpace, FramecastError, OutputConfig, OverflowPolicy, Result, RgbaFrame,
    TransferFunction, WireFormat,
};
use framecast_stream::{OutputStream, RecordingSink};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Backend whose conversions always fail after a successful init.
#[derive(Default)]
struct BrokenGpu {
    init_fails: bool,
    calls: AtomicUsize,
}

impl ComputeBackend for BrokenGpu {
    fn name(&self) -> &str {
        "broken"
    }

    fn init(&self) -> Result<()> {
        if self.init_fails {
            Err(FramecastError::BackendUnavailable("no device".to_string()))
        } else {
            Ok(())
        }
    }

    fn is_initialized(&self) -> bool {
        !self.init_fails
    }

    fn convert_packed8_422(&self, _frame: &RgbaFrame<'_>, _out: &mut [u8]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(FramecastError::ConversionFailed("device lost".to_string()))
    }

    fn convert_planar16_422(
        &self,
        _frame: &RgbaFrame<'_>,
        _matrix: YuvMatrix,
        _out: &mut [u16],
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(FramecastError::ConversionFailed("device lost".to_string()))
    }

    fn shutdown(&self) {}
}

fn live() -> OutputConfig {
    OutputConfig {
        enabled: true,
        ..Default::default()
    }
}

#[test]
fn white_1080p_reaches_the_sender() {
    let sink = RecordingSink::new();
    // Real GPU backend: converts on the GPU when present, falls back otherwise.
    let mut stream = OutputStream::new(Box::new(sink.clone()), &live());
    let pixels = solid_pixels(1920, 1080, [1.0; 4]);
    stream.submit_frame(&pixels, 1920, 1080, &live()).unwrap();

    let frames = sink.frames();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.format, WireFormat::Uyvy);
    assert_eq!(frame.line_stride, 3840);
    assert_eq!(frame.data.len(), 1920 * 1080 * 2);
    assert_eq!(frame.frame_rate.to_fps_f64(), 25.0);
    for quad in frame.data.chunks_exact(4) {
        assert!(quad[1] >= 254 && quad[3] >= 254);
        assert!(quad[0].abs_diff(127) <= 1 && quad[2].abs_diff(127) <= 1);
    }

    let stats = stream.stats();
    assert_eq!(stats.frames_sent, 1);
    assert_eq!(
        stats.dispatch.gpu_conversions + stats.dispatch.cpu_conversions,
        1
    );
}

#[test]
fn failing_gpu_falls_back_per_frame() {
    let sink = RecordingSink::new();
    let gpu = Arc::new(BrokenGpu::default());
    let dispatcher = ConversionDispatcher::with_gpu(CpuBackend::new(), gpu.clone(), true);
    let mut stream = OutputStream::with_dispatcher(Box::new(sink.clone()), dispatcher);

    let pixels = solid_pixels(32, 8, [0.25, 0.5, 0.75, 1.0]);
    for _ in 0..3 {
        stream.submit_frame(&pixels, 32, 8, &live()).unwrap();
    }

    assert_eq!(sink.frame_count(), 3);
    // Every frame retried the GPU: a conversion failure is not latched.
    assert_eq!(gpu.calls.load(Ordering::Relaxed), 3);
    let stats = stream.stats().dispatch;
    assert_eq!(stats.gpu_fallbacks, 3);
    assert_eq!(stats.cpu_conversions, 3);
    assert_eq!(stream.dispatcher().gpu_status(), GpuStatus::Ready);
}

#[test]
fn failed_init_latches_cpu_path() {
    let sink = RecordingSink::new();
    let gpu = Arc::new(BrokenGpu {
        init_fails: true,
        ..Default::default()
    });
    let dispatcher = ConversionDispatcher::with_gpu(CpuBackend::new(), gpu.clone(), true);
    let mut stream = OutputStream::with_dispatcher(Box::new(sink.clone()), dispatcher);

    let hdr = OutputConfig {
        hdr_enabled: true,
        color_space: ColorSpace::Rec2020,
        transfer_function: TransferFunction::Pq,
        ..live()
    };
    let pixels = solid_pixels(16, 4, [0.8; 4]);
    for _ in 0..4 {
        stream.submit_frame(&pixels, 16, 4, &hdr).unwrap();
    }

    assert_eq!(sink.frame_count(), 4);
    assert_eq!(gpu.calls.load(Ordering::Relaxed), 0);
    assert_eq!(stream.dispatcher().gpu_status(), GpuStatus::Unavailable);
    assert_eq!(stream.stats().dispatch.gpu_init_failures, 1);
    assert!(sink
        .frames()
        .iter()
        .all(|f| f.format == WireFormat::P216
            && f.metadata.as_deref().is_some_and(|m| m.contains("bt_2100_pq"))));
}

#[test]
fn async_queue_keeps_order_across_many_frames() {
    let sink = RecordingSink::new();
    let mut stream = OutputStream::with_dispatcher(
        Box::new(sink.clone()),
        ConversionDispatcher::cpu_only(CpuBackend::with_parallel(true)),
    );
    let config = OutputConfig {
        async_sending: true,
        ..live()
    };

    for i in 0..50 {
        let level = (i % 10) as f32 / 10.0;
        let pixels = solid_pixels(64, 36, [level, level, level, 1.0]);
        stream.submit_frame(&pixels, 64, 36, &config).unwrap();
    }
    assert!(stream.flush(Duration::from_secs(10)));

    let frames = sink.frames();
    assert_eq!(frames.len(), 50);
    assert!(frames.windows(2).all(|w| w[0].sequence + 1 == w[1].sequence));
    stream.stop();
    assert!(!stream.is_sender_open());
}

#[test]
fn bounded_queue_counts_drops() {
    let sink = RecordingSink::new();
    let mut stream = OutputStream::with_dispatcher(
        Box::new(sink.clone()),
        ConversionDispatcher::cpu_only(CpuBackend::new()),
    );
    let config = OutputConfig {
        async_sending: true,
        queue_depth: Some(2),
        queue_overflow: OverflowPolicy::DropOldest,
        ..live()
    };

    let pixels = solid_pixels(1280, 720, [0.3; 4]);
    for _ in 0..20 {
        stream.submit_frame(&pixels, 1280, 720, &config).unwrap();
    }
    assert!(stream.flush(Duration::from_secs(30)));

    let pipeline = stream.stats().pipeline.unwrap();
    assert_eq!(pipeline.enqueued, 20);
    assert_eq!(pipeline.processed + pipeline.dropped, 20);
    assert_eq!(sink.frame_count() as u64, pipeline.processed);
}

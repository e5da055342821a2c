//! Per-frame submission: configuration, conversion and sending.

use crate::pipeline::{AsyncFramePipeline, PipelineOptions, PipelineStats};
use crate::sink::{NetworkSink, OutgoingFrame, SenderSettings};
use framecast_color::{ColorInfoTag, HdrMetadata, YuvMatrix};
use framecast_convert::{ConversionDispatcher, ConversionRequest, CpuBackend, DispatchStats};
use framecast_core::{
    EncodedFrame, FrameRate, OutputConfig, PendingFrame, Result, RgbaFrame, WireFormat,
};
use framecast_gpu::GpuBackend;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Counters across conversion, queueing and sending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub dispatch: DispatchStats,
    pub pipeline: Option<PipelineStats>,
    pub frames_sent: u64,
    pub send_failures: u64,
}

/// Settings read by whichever thread sends the next frame.
#[derive(Debug, Clone)]
struct SendSettings {
    sdr: ConversionRequest,
    hdr: ConversionRequest,
    frame_rate: FrameRate,
    /// Color info tag attached to HDR frames.
    metadata: Arc<str>,
}

impl SendSettings {
    fn from_config(config: &OutputConfig) -> Self {
        let sdr = if config.optimal_format {
            ConversionRequest::UYVY
        } else {
            ConversionRequest::RGBA
        };
        let mut tag = ColorInfoTag::new(config.color());
        if config.embed_light_levels {
            tag = tag.with_light_levels(HdrMetadata::from_config(config));
        }
        Self {
            sdr,
            hdr: ConversionRequest::p216(YuvMatrix::for_color_space(config.color_space)),
            frame_rate: config.rate(),
            metadata: Arc::from(tag.to_string()),
        }
    }
}

struct SenderState {
    sink: Box<dyn NetworkSink>,
    source_name: Option<String>,
}

/// State shared between the submitting thread and the send worker.
///
/// The sender lock is only taken by the submitting thread when the sender
/// is opened, closed or renamed, so handing off a frame never waits on a
/// conversion or send in flight.
struct StreamCore {
    dispatcher: ConversionDispatcher,
    settings: Mutex<SendSettings>,
    /// Conversion output, reused across frames. Held from conversion until sent.
    encoded: Mutex<EncodedFrame>,
    sender: Mutex<SenderState>,
    sender_open: AtomicBool,
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
}

impl StreamCore {
    /// Convert and send one frame.
    fn process(&self, frame: &RgbaFrame<'_>, hdr: bool, captured_at: Instant, sequence: u64) -> Result<()> {
        if !self.sender_open.load(Ordering::Acquire) {
            debug!(sequence, "sender closed, frame skipped");
            return Ok(());
        }

        let settings = self.settings.lock().clone();
        let request = if hdr { settings.hdr } else { settings.sdr };
        let metadata = hdr.then_some(&*settings.metadata);

        let mut encoded = self.encoded.lock();
        self.dispatcher.convert_into(frame, request, &mut encoded)?;
        let outgoing = OutgoingFrame::new(
            &encoded,
            settings.frame_rate,
            metadata,
            captured_at,
            sequence,
        );

        let mut sender = self.sender.lock();
        if sender.source_name.is_none() {
            debug!(sequence, "sender closed during conversion, frame skipped");
            return Ok(());
        }
        match sender.sink.send_video(&outgoing) {
            Ok(()) => {
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    sequence,
                    format = request.format.fourcc_str(),
                    error = %e,
                    "sender rejected frame"
                );
                Err(e)
            }
        }
    }

    fn process_pending(&self, pending: PendingFrame) -> Result<()> {
        let frame = pending.as_frame()?;
        self.process(&frame, pending.hdr, pending.captured_at, pending.sequence)
    }

    fn open_sender(&self, state: &mut SenderState, source_name: &str) -> Result<()> {
        state
            .sink
            .open(&SenderSettings::new(source_name))
            .map_err(|e| {
                error!(source = source_name, error = %e, "failed to open sender");
                e
            })?;
        state.source_name = Some(source_name.to_string());
        self.sender_open.store(true, Ordering::Release);
        info!(source = source_name, "sender started");
        Ok(())
    }

    fn close_sender(&self, state: &mut SenderState) {
        if let Some(source) = state.source_name.take() {
            self.sender_open.store(false, Ordering::Release);
            state.sink.close();
            info!(source = %source, "sender stopped");
        }
    }
}

/// One output stream: owns its compute backend, sender and optional send worker.
pub struct OutputStream {
    core: Arc<StreamCore>,
    pipeline: Option<AsyncFramePipeline>,
    /// Last applied configuration.
    config: Option<OutputConfig>,
    /// Source the sender is open as. Only this thread opens or closes it.
    open_source: Option<String>,
    next_sequence: u64,
}

impl OutputStream {
    /// Stream with a GPU backend configured from `config`. GPU initialization is
    /// deferred to the first frame that wants it.
    pub fn new(sink: Box<dyn NetworkSink>, config: &OutputConfig) -> Self {
        let gpu = Arc::new(GpuBackend::with_timeout(Duration::from_millis(
            config.gpu_timeout_ms,
        )));
        let dispatcher = ConversionDispatcher::with_gpu(
            CpuBackend::with_parallel(config.parallel_cpu),
            gpu,
            config.gpu_acceleration,
        );
        Self::with_dispatcher(sink, dispatcher)
    }

    /// Stream with a caller-built dispatcher.
    pub fn with_dispatcher(sink: Box<dyn NetworkSink>, dispatcher: ConversionDispatcher) -> Self {
        Self {
            core: Arc::new(StreamCore {
                dispatcher,
                settings: Mutex::new(SendSettings::from_config(&OutputConfig::default())),
                encoded: Mutex::new(EncodedFrame::empty(WireFormat::Uyvy)),
                sender: Mutex::new(SenderState {
                    sink,
                    source_name: None,
                }),
                sender_open: AtomicBool::new(false),
                frames_sent: AtomicU64::new(0),
                send_failures: AtomicU64::new(0),
            }),
            pipeline: None,
            config: None,
            open_source: None,
            next_sequence: 0,
        }
    }

    /// Submit one rendered frame with the host's current settings.
    ///
    /// An invalid frame makes the call a no-op and returns `InvalidFrame`.
    /// With async sending the frame is copied and queued; otherwise it is
    /// converted and sent before returning.
    pub fn submit_frame(
        &mut self,
        pixels: &[f32],
        width: u32,
        height: u32,
        config: &OutputConfig,
    ) -> Result<()> {
        let frame = RgbaFrame::new(pixels, width, height).map_err(|e| {
            warn!(width, height, error = %e, "frame rejected");
            e
        })?;

        self.apply_config(config)?;
        if !config.enabled {
            return Ok(());
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        match &self.pipeline {
            Some(pipeline) => pipeline.enqueue(frame.to_pending(config.hdr_enabled, sequence)),
            None => self
                .core
                .process(&frame, config.hdr_enabled, Instant::now(), sequence),
        }
    }

    /// Apply settings: sender lifecycle, GPU preference and async sending.
    ///
    /// Only work that the change requires is done; an unchanged configuration
    /// takes no lock the send worker holds.
    pub fn apply_config(&mut self, config: &OutputConfig) -> Result<()> {
        if self.config.as_ref() == Some(config) {
            return Ok(());
        }
        config.validate()?;

        *self.core.settings.lock() = SendSettings::from_config(config);
        self.core.dispatcher.set_prefer_gpu(config.gpu_acceleration);

        let wanted = config.enabled.then_some(config.source_name.as_str());
        if self.open_source.as_deref() != wanted {
            self.update_sender(wanted)?;
        }

        let options = PipelineOptions {
            queue_depth: config.queue_depth,
            overflow: config.queue_overflow,
        };
        match (&self.pipeline, config.async_sending) {
            (None, true) => {
                let core = Arc::clone(&self.core);
                let pipeline = AsyncFramePipeline::new(
                    Arc::new(move |pending: PendingFrame| core.process_pending(pending)),
                    options,
                );
                pipeline.start()?;
                self.pipeline = Some(pipeline);
            }
            (Some(_), false) => {
                if let Some(pipeline) = self.pipeline.take() {
                    pipeline.stop();
                }
            }
            (Some(pipeline), true) if pipeline.options() != options => {
                pipeline.set_options(options);
            }
            _ => {}
        }

        self.config = Some(config.clone());
        Ok(())
    }

    /// Close, open or restart the sender so it advertises `wanted`.
    fn update_sender(&mut self, wanted: Option<&str>) -> Result<()> {
        let mut sender = self.core.sender.lock();
        if let Some(current) = self.open_source.take() {
            match wanted {
                Some(name) => {
                    info!(from = %current, to = name, "source renamed, restarting sender")
                }
                None => debug!(source = %current, "output disabled"),
            }
            self.core.close_sender(&mut sender);
        }
        if let Some(name) = wanted {
            self.core.open_sender(&mut sender, name)?;
            self.open_source = Some(name.to_string());
        }
        Ok(())
    }

    /// Stop the send worker, release the compute backend, then close the sender.
    pub fn stop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
        self.core.dispatcher.shutdown();
        let mut sender = self.core.sender.lock();
        self.core.close_sender(&mut sender);
        self.open_source = None;
        // Re-applying any configuration after a stop starts over.
        self.config = None;
    }

    /// Wait for queued frames to be sent. True immediately without async sending.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.pipeline
            .as_ref()
            .map_or(true, |pipeline| pipeline.wait_idle(timeout))
    }

    pub fn is_sender_open(&self) -> bool {
        self.open_source.is_some()
    }

    pub fn is_async(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Configuration applied by the last `submit_frame` or `apply_config`.
    pub fn config(&self) -> Option<&OutputConfig> {
        self.config.as_ref()
    }

    pub fn dispatcher(&self) -> &ConversionDispatcher {
        &self.core.dispatcher
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            dispatch: self.core.dispatcher.stats(),
            pipeline: self.pipeline.as_ref().map(AsyncFramePipeline::stats),
            frames_sent: self.core.frames_sent.load(Ordering::Relaxed),
            send_failures: self.core.send_failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("open_source", &self.open_source)
            .field("async", &self.is_async())
            .field("dispatcher", &self.core.dispatcher)
            .finish()
    }
}

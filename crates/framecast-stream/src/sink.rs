//! The network sender contract and two in-process sinks.

use framecast_core::{EncodedFrame, FrameRate, FramecastError, Result, WireFormat};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// How the sender announces itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderSettings {
    pub source_name: String,
    /// Let the sender pace video to the frame rate.
    pub clock_video: bool,
}

impl SenderSettings {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            clock_video: true,
        }
    }
}

/// Timecode value asking the sender to derive it from its own clock.
pub const TIMECODE_SYNTHESIZE: i64 = i64::MAX;

/// One video frame as handed to the sender.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingFrame<'a> {
    pub format: WireFormat,
    pub width: u32,
    pub height: u32,
    pub line_stride: usize,
    pub data: &'a [u8],
    pub frame_rate: FrameRate,
    pub picture_aspect_ratio: f32,
    pub progressive: bool,
    /// In 100 ns units, or [`TIMECODE_SYNTHESIZE`].
    pub timecode: i64,
    /// Color info tag for HDR frames.
    pub metadata: Option<&'a str>,
    pub captured_at: Instant,
    pub sequence: u64,
}

impl<'a> OutgoingFrame<'a> {
    /// Describe an encoded frame as a progressive frame with synthesized timecode.
    pub fn new(
        encoded: &'a EncodedFrame,
        frame_rate: FrameRate,
        metadata: Option<&'a str>,
        captured_at: Instant,
        sequence: u64,
    ) -> Self {
        Self {
            format: encoded.format,
            width: encoded.width,
            height: encoded.height,
            line_stride: encoded.line_stride(),
            data: encoded.as_bytes(),
            frame_rate,
            picture_aspect_ratio: encoded.width as f32 / encoded.height.max(1) as f32,
            progressive: true,
            timecode: TIMECODE_SYNTHESIZE,
            metadata,
            captured_at,
            sequence,
        }
    }

    pub fn fourcc(&self) -> [u8; 4] {
        self.format.fourcc()
    }
}

/// A network video sender.
pub trait NetworkSink: Send {
    /// Start advertising a source.
    fn open(&mut self, settings: &SenderSettings) -> Result<()>;

    /// Stop advertising. Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Send one frame. The data is only borrowed for the duration of the call.
    fn send_video(&mut self, frame: &OutgoingFrame<'_>) -> Result<()>;
}

/// Owned copy of a frame received by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub format: WireFormat,
    pub width: u32,
    pub height: u32,
    pub line_stride: usize,
    pub data: Vec<u8>,
    pub frame_rate: FrameRate,
    pub picture_aspect_ratio: f32,
    pub metadata: Option<String>,
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct Recording {
    frames: Vec<SentFrame>,
    opened: Vec<SenderSettings>,
    closes: usize,
    open: bool,
}

/// Sink that keeps every frame in memory. Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<SentFrame> {
        self.inner.lock().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Source names passed to `open`, in order.
    pub fn opened_sources(&self) -> Vec<String> {
        self.inner
            .lock()
            .opened
            .iter()
            .map(|s| s.source_name.clone())
            .collect()
    }

    /// Settings passed to `open`, in order.
    pub fn opened_settings(&self) -> Vec<SenderSettings> {
        self.inner.lock().opened.clone()
    }

    pub fn close_count(&self) -> usize {
        self.inner.lock().closes
    }
}

impl NetworkSink for RecordingSink {
    fn open(&mut self, settings: &SenderSettings) -> Result<()> {
        let mut rec = self.inner.lock();
        rec.opened.push(settings.clone());
        rec.open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut rec = self.inner.lock();
        if rec.open {
            rec.open = false;
            rec.closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    fn send_video(&mut self, frame: &OutgoingFrame<'_>) -> Result<()> {
        let mut rec = self.inner.lock();
        if !rec.open {
            return Err(FramecastError::Sink("sender is not open".to_string()));
        }
        rec.frames.push(SentFrame {
            format: frame.format,
            width: frame.width,
            height: frame.height,
            line_stride: frame.line_stride,
            data: frame.data.to_vec(),
            frame_rate: frame.frame_rate,
            picture_aspect_ratio: frame.picture_aspect_ratio,
            metadata: frame.metadata.map(str::to_string),
            sequence: frame.sequence,
        });
        Ok(())
    }
}

/// Sink that only logs, every `interval` frames.
#[derive(Debug)]
pub struct LogSink {
    source: Option<String>,
    clock_video: bool,
    interval: u64,
    sent: u64,
}

impl LogSink {
    pub fn new(interval: u64) -> Self {
        Self {
            source: None,
            clock_video: false,
            interval: interval.max(1),
            sent: 0,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Whether the open sender paces video to the frame rate.
    pub fn clock_video(&self) -> bool {
        self.clock_video
    }
}

impl NetworkSink for LogSink {
    fn open(&mut self, settings: &SenderSettings) -> Result<()> {
        info!(
            source = %settings.source_name,
            clock_video = settings.clock_video,
            "sender opened"
        );
        self.source = Some(settings.source_name.clone());
        self.clock_video = settings.clock_video;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(source) = self.source.take() {
            info!(source = %source, frames = self.sent, "sender closed");
        }
    }

    fn is_open(&self) -> bool {
        self.source.is_some()
    }

    fn send_video(&mut self, frame: &OutgoingFrame<'_>) -> Result<()> {
        let Some(source) = &self.source else {
            return Err(FramecastError::Sink("sender is not open".to_string()));
        };
        self.sent += 1;
        if self.sent % self.interval == 0 {
            info!(
                source = %source,
                format = frame.format.fourcc_str(),
                width = frame.width,
                height = frame.height,
                bytes = frame.data.len(),
                rate = %frame.frame_rate,
                metadata = frame.metadata.unwrap_or(""),
                latency_us = frame.captured_at.elapsed().as_micros() as u64,
                "sent {} frames",
                self.sent
            );
        }
        Ok(())
    }
}

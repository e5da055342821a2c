//! Frame types: the float RGBA frames handed over by the host, the encoded
//! wire frames produced by conversion, and the owned copies queued for the
//! asynchronous sender.

use crate::error::{FramecastError, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Float samples per RGBA pixel.
pub const RGBA_CHANNELS: usize = 4;

/// Borrowed view of a float RGBA frame.
///
/// Rows are stored bottom-up: row 0 is the bottom of the picture, which is the
/// host's coordinate convention. Samples are nominally in [0, 1] but HDR
/// content may exceed 1.0.
#[derive(Debug, Clone, Copy)]
pub struct RgbaFrame<'a> {
    pixels: &'a [f32],
    width: u32,
    height: u32,
}

impl<'a> RgbaFrame<'a> {
    /// Wrap a caller-owned buffer, rejecting empty buffers and degenerate sizes.
    pub fn new(pixels: &'a [f32], width: u32, height: u32) -> Result<Self> {
        if pixels.is_empty() {
            return Err(FramecastError::InvalidFrame("empty pixel buffer".to_string()));
        }
        if width == 0 || height == 0 {
            return Err(FramecastError::InvalidFrame(format!(
                "non-positive dimensions {}x{}",
                width, height
            )));
        }

        let needed = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(RGBA_CHANNELS))
            .ok_or_else(|| {
                FramecastError::InvalidFrame(format!("frame {}x{} is too large", width, height))
            })?;

        if pixels.len() < needed {
            return Err(FramecastError::InvalidFrame(format!(
                "buffer holds {} samples, {}x{} RGBA needs {}",
                pixels.len(),
                width,
                height,
                needed
            )));
        }

        Ok(Self {
            pixels: &pixels[..needed],
            width,
            height,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// All samples, exactly `width * height * 4` long.
    #[inline]
    pub fn pixels(&self) -> &'a [f32] {
        self.pixels
    }

    /// A source row in storage order (row 0 is the bottom of the picture).
    #[inline]
    pub fn row(&self, y: u32) -> &'a [f32] {
        let stride = self.width as usize * RGBA_CHANNELS;
        let start = y as usize * stride;
        &self.pixels[start..start + stride]
    }

    /// The source row that lands on output row `y` once the picture is flipped
    /// to a top-left origin.
    #[inline]
    pub fn flipped_row(&self, y: u32) -> &'a [f32] {
        self.row(self.height - 1 - y)
    }

    /// RGBA of a single pixel in storage coordinates.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let i = x as usize * RGBA_CHANNELS;
        let row = self.row(y);
        [row[i], row[i + 1], row[i + 2], row[i + 3]]
    }

    /// Copy the frame into an owned queue element.
    pub fn to_pending(&self, hdr: bool, sequence: u64) -> PendingFrame {
        PendingFrame {
            pixels: self.pixels.to_vec(),
            width: self.width,
            height: self.height,
            hdr,
            captured_at: Instant::now(),
            sequence,
        }
    }
}

/// Pixel layouts accepted by the network sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireFormat {
    /// 8-bit packed 4:2:2, bytes ordered U Y0 V Y1 per pixel pair.
    Uyvy,
    /// 16-bit 4:2:2: a Y plane followed by an interleaved UV plane.
    P216,
    /// 8-bit packed 4:4:4 RGBA.
    Rgba,
}

impl WireFormat {
    /// FourCC tag handed to the sink.
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            Self::Uyvy => *b"UYVY",
            Self::P216 => *b"P216",
            Self::Rgba => *b"RGBA",
        }
    }

    pub fn fourcc_str(self) -> &'static str {
        match self {
            Self::Uyvy => "UYVY",
            Self::P216 => "P216",
            Self::Rgba => "RGBA",
        }
    }

    /// Whether chroma is shared by horizontal pixel pairs.
    pub fn is_subsampled(self) -> bool {
        matches!(self, Self::Uyvy | Self::P216)
    }

    /// Bits per stored sample.
    pub fn bits_per_sample(self) -> u32 {
        match self {
            Self::Uyvy | Self::Rgba => 8,
            Self::P216 => 16,
        }
    }

    /// Encoded width. 4:2:2 layouts round odd widths up to a whole pixel pair;
    /// the extra column repeats the last source column.
    pub fn encoded_width(self, width: u32) -> u32 {
        if self.is_subsampled() {
            width + (width & 1)
        } else {
            width
        }
    }

    /// Pixel pairs per row for the 4:2:2 layouts.
    pub fn pairs_per_row(width: u32) -> u32 {
        width.div_ceil(2)
    }

    /// Bytes per line. For P216 this is the Y plane stride, which the UV plane shares.
    pub fn line_stride(self, width: u32) -> usize {
        let w = self.encoded_width(width) as usize;
        match self {
            Self::Uyvy | Self::P216 => w * 2,
            Self::Rgba => w * 4,
        }
    }

    /// Number of stored samples (bytes for the 8-bit layouts, 16-bit words for P216).
    pub fn sample_count(self, width: u32, height: u32) -> usize {
        let w = self.encoded_width(width) as usize;
        let h = height as usize;
        match self {
            Self::Uyvy => w * h * 2,
            Self::P216 => w * h * 2,
            Self::Rgba => w * h * 4,
        }
    }

    /// Total encoded size in bytes.
    pub fn byte_size(self, width: u32, height: u32) -> usize {
        self.sample_count(width, height) * (self.bits_per_sample() as usize / 8)
    }
}

/// Storage for encoded samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedData {
    Bytes(Vec<u8>),
    Words(Vec<u16>),
}

/// A frame in one of the wire layouts, origin top-left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub format: WireFormat,
    pub width: u32,
    pub height: u32,
    pub data: EncodedData,
}

impl EncodedFrame {
    /// An empty frame whose buffer grows on first use.
    pub fn empty(format: WireFormat) -> Self {
        let data = match format {
            WireFormat::P216 => EncodedData::Words(Vec::new()),
            WireFormat::Uyvy | WireFormat::Rgba => EncodedData::Bytes(Vec::new()),
        };
        Self {
            format,
            width: 0,
            height: 0,
            data,
        }
    }

    /// Reshape for an 8-bit layout and return the sample buffer.
    ///
    /// The existing allocation is reused when it is already large enough.
    pub fn prepare_bytes(&mut self, format: WireFormat, width: u32, height: u32) -> &mut [u8] {
        debug_assert_ne!(format, WireFormat::P216);
        let len = format.sample_count(width, height);
        self.format = format;
        self.width = width;
        self.height = height;
        if !matches!(self.data, EncodedData::Bytes(_)) {
            self.data = EncodedData::Bytes(Vec::with_capacity(len));
        }
        match &mut self.data {
            EncodedData::Bytes(bytes) => {
                bytes.resize(len, 0);
                bytes.as_mut_slice()
            }
            EncodedData::Words(_) => unreachable!("data was just reset to bytes"),
        }
    }

    /// Reshape for P216 and return the sample buffer (Y plane, then UV plane).
    pub fn prepare_words(&mut self, width: u32, height: u32) -> &mut [u16] {
        let len = WireFormat::P216.sample_count(width, height);
        self.format = WireFormat::P216;
        self.width = width;
        self.height = height;
        if !matches!(self.data, EncodedData::Words(_)) {
            self.data = EncodedData::Words(Vec::with_capacity(len));
        }
        match &mut self.data {
            EncodedData::Words(words) => {
                words.resize(len, 0);
                words.as_mut_slice()
            }
            EncodedData::Bytes(_) => unreachable!("data was just reset to words"),
        }
    }

    /// Raw bytes as handed to the sink (16-bit samples in native byte order).
    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            EncodedData::Bytes(bytes) => bytes,
            EncodedData::Words(words) => bytemuck::cast_slice(words),
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.data {
            EncodedData::Bytes(bytes) => Some(bytes),
            EncodedData::Words(_) => None,
        }
    }

    pub fn words(&self) -> Option<&[u16]> {
        match &self.data {
            EncodedData::Words(words) => Some(words),
            EncodedData::Bytes(_) => None,
        }
    }

    /// Bytes per line for the sink.
    pub fn line_stride(&self) -> usize {
        self.format.line_stride(self.width)
    }

    /// Y and UV planes of a P216 frame.
    pub fn planes(&self) -> Option<(&[u16], &[u16])> {
        let words = self.words()?;
        let split = self.format.encoded_width(self.width) as usize * self.height as usize;
        Some(words.split_at(split.min(words.len())))
    }
}

/// Owned copy of a frame waiting in the asynchronous send queue.
#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub pixels: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub hdr: bool,
    pub captured_at: Instant,
    /// Submission order, assigned by the producer.
    pub sequence: u64,
}

impl PendingFrame {
    /// Borrow the queued pixels as a frame view.
    pub fn as_frame(&self) -> Result<RgbaFrame<'_>> {
        RgbaFrame::new(&self.pixels, self.width, self.height)
    }
}

/// Build a float RGBA buffer filled with one color.
pub fn solid_pixels(width: u32, height: u32, rgba: [f32; 4]) -> Vec<f32> {
    let count = width as usize * height as usize;
    let mut pixels = Vec::with_capacity(count * RGBA_CHANNELS);
    for _ in 0..count {
        pixels.extend_from_slice(&rgba);
    }
    pixels
}

/// Build a float RGBA color-bar test pattern (8 vertical bars).
pub fn color_bars(width: u32, height: u32) -> Vec<f32> {
    const BARS: [[f32; 4]; 8] = [
        [1.0, 1.0, 1.0, 1.0], // White
        [1.0, 1.0, 0.0, 1.0], // Yellow
        [0.0, 1.0, 1.0, 1.0], // Cyan
        [0.0, 1.0, 0.0, 1.0], // Green
        [1.0, 0.0, 1.0, 1.0], // Magenta
        [1.0, 0.0, 0.0, 1.0], // Red
        [0.0, 0.0, 1.0, 1.0], // Blue
        [0.0, 0.0, 0.0, 1.0], // Black
    ];

    let mut pixels = Vec::with_capacity(width as usize * height as usize * RGBA_CHANNELS);
    for _ in 0..height {
        for x in 0..width {
            let bar = (x as u64 * 8 / width.max(1) as u64) as usize;
            pixels.extend_from_slice(&BARS[bar.min(7)]);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_empty_buffer() {
        let err = RgbaFrame::new(&[], 4, 4).unwrap_err();
        assert!(matches!(err, FramecastError::InvalidFrame(_)));
    }

    #[test]
    fn rejects_zero_dimensions() {
        let pixels = vec![0.0; 16];
        assert!(RgbaFrame::new(&pixels, 0, 4).is_err());
        assert!(RgbaFrame::new(&pixels, 4, 0).is_err());
    }

    #[test]
    fn rejects_short_buffer() {
        let pixels = vec![0.0; 4 * 4 * 4 - 1];
        assert!(RgbaFrame::new(&pixels, 4, 4).is_err());
    }

    #[test]
    fn trims_oversized_buffer() {
        let pixels = vec![0.5; 100];
        let frame = RgbaFrame::new(&pixels, 2, 2).unwrap();
        assert_eq!(frame.pixels().len(), 16);
    }

    #[test]
    fn flipped_row_reads_from_the_top() {
        let mut pixels = solid_pixels(2, 3, [0.0; 4]);
        // Storage row 2 is the top of the picture.
        pixels[2 * 2 * 4] = 1.0;
        let frame = RgbaFrame::new(&pixels, 2, 3).unwrap();
        assert_eq!(frame.flipped_row(0)[0], 1.0);
        assert_eq!(frame.row(0)[0], 0.0);
    }

    #[test]
    fn wire_format_sizes() {
        assert_eq!(WireFormat::Uyvy.byte_size(1920, 1080), 1920 * 1080 * 2);
        assert_eq!(WireFormat::P216.byte_size(1920, 1080), 1920 * 1080 * 4);
        assert_eq!(WireFormat::Rgba.byte_size(1920, 1080), 1920 * 1080 * 4);
        assert_eq!(WireFormat::Uyvy.line_stride(1920), 3840);
        assert_eq!(WireFormat::Rgba.line_stride(1920), 7680);
    }

    #[test]
    fn odd_width_rounds_up_to_pair() {
        assert_eq!(WireFormat::Uyvy.encoded_width(5), 6);
        assert_eq!(WireFormat::Rgba.encoded_width(5), 5);
        assert_eq!(WireFormat::pairs_per_row(5), 3);
        assert_eq!(WireFormat::Uyvy.byte_size(5, 2), 6 * 2 * 2);
    }

    #[test]
    fn fourcc_tags() {
        assert_eq!(&WireFormat::Uyvy.fourcc(), b"UYVY");
        assert_eq!(WireFormat::P216.fourcc_str(), "P216");
    }

    #[test]
    fn prepare_reuses_allocation() {
        let mut encoded = EncodedFrame::empty(WireFormat::Uyvy);
        encoded.prepare_bytes(WireFormat::Uyvy, 64, 64);
        let ptr = encoded.as_bytes().as_ptr();
        encoded.prepare_bytes(WireFormat::Uyvy, 32, 32);
        assert_eq!(encoded.as_bytes().as_ptr(), ptr);
        assert_eq!(encoded.as_bytes().len(), 32 * 32 * 2);
    }

    #[test]
    fn prepare_words_switches_storage() {
        let mut encoded = EncodedFrame::empty(WireFormat::Uyvy);
        let words = encoded.prepare_words(4, 2);
        assert_eq!(words.len(), 16);
        assert_eq!(encoded.format, WireFormat::P216);
        assert_eq!(encoded.as_bytes().len(), 32);
        let (y, uv) = encoded.planes().unwrap();
        assert_eq!(y.len(), 8);
        assert_eq!(uv.len(), 8);
    }

    #[test]
    fn pending_frame_round_trips_view() {
        let pixels = color_bars(8, 2);
        let frame = RgbaFrame::new(&pixels, 8, 2).unwrap();
        let pending = frame.to_pending(true, 7);
        assert!(pending.hdr);
        assert_eq!(pending.sequence, 7);
        assert_eq!(pending.as_frame().unwrap().pixel(0, 0), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn color_bars_ends_black() {
        let pixels = color_bars(16, 1);
        let frame = RgbaFrame::new(&pixels, 16, 1).unwrap();
        assert_eq!(frame.pixel(15, 0), [0.0, 0.0, 0.0, 1.0]);
    }

    proptest! {
        #[test]
        fn encoded_size_is_pure_function_of_dims(w in 1u32..512, h in 1u32..64) {
            for format in [WireFormat::Uyvy, WireFormat::P216, WireFormat::Rgba] {
                let size = format.byte_size(w, h);
                prop_assert_eq!(size, format.line_stride(w) * h as usize
                    * if format == WireFormat::P216 { 2 } else { 1 });
            }
        }
    }
}

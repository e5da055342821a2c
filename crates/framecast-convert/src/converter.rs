//! CPU reference conversion from float RGBA to the wire layouts.
//!
//! Every layout flips the picture vertically: output row `y` is read from
//! source row `height - 1 - y`. The 4:2:2 layouts walk pixel pairs and, on odd
//! widths, pair the last column with itself.

use framecast_color::pixel_math::{clamp01, encode_pair16, encode_pair8, quantize8, YuvMatrix};
use framecast_core::{
    EncodedFrame, FramecastError, Result, RgbaFrame, WireFormat, RGBA_CHANNELS,
};
use rayon::prelude::*;

/// Converts whole frames, optionally spreading the rows of one frame over
/// the rayon pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatConverter {
    parallel: bool,
}

impl FormatConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row-parallel conversion. Frames are still converted one at a time.
    pub fn with_parallel(parallel: bool) -> Self {
        Self { parallel }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// 8-bit 4:2:2 packed as U Y0 V Y1, Rec. 709.
    pub fn to_packed8_422(&self, frame: &RgbaFrame<'_>) -> Vec<u8> {
        let mut out = vec![0u8; WireFormat::Uyvy.sample_count(frame.width(), frame.height())];
        self.fill_packed8_422(frame, &mut out);
        out
    }

    /// 16-bit 4:2:2 limited range: Y plane followed by the interleaved UV plane.
    pub fn to_planar16_422(&self, frame: &RgbaFrame<'_>, matrix: YuvMatrix) -> Vec<u16> {
        let mut out = vec![0u16; WireFormat::P216.sample_count(frame.width(), frame.height())];
        self.fill_planar16_422(frame, matrix, &mut out);
        out
    }

    /// 8-bit RGBA, every channel clamped and quantized the same way.
    pub fn to_packed8_444(&self, frame: &RgbaFrame<'_>) -> Vec<u8> {
        let mut out = vec![0u8; WireFormat::Rgba.sample_count(frame.width(), frame.height())];
        self.fill_packed8_444(frame, &mut out);
        out
    }

    /// Convert into a caller-owned buffer of exactly the encoded size.
    pub fn packed8_422_into(&self, frame: &RgbaFrame<'_>, out: &mut [u8]) -> Result<()> {
        check_len(WireFormat::Uyvy, frame, out.len())?;
        self.fill_packed8_422(frame, out);
        Ok(())
    }

    pub fn planar16_422_into(
        &self,
        frame: &RgbaFrame<'_>,
        matrix: YuvMatrix,
        out: &mut [u16],
    ) -> Result<()> {
        check_len(WireFormat::P216, frame, out.len())?;
        self.fill_planar16_422(frame, matrix, out);
        Ok(())
    }

    pub fn packed8_444_into(&self, frame: &RgbaFrame<'_>, out: &mut [u8]) -> Result<()> {
        check_len(WireFormat::Rgba, frame, out.len())?;
        self.fill_packed8_444(frame, out);
        Ok(())
    }

    /// Convert into an [`EncodedFrame`], reusing its allocation.
    pub fn convert_into(
        &self,
        frame: &RgbaFrame<'_>,
        format: WireFormat,
        matrix: YuvMatrix,
        out: &mut EncodedFrame,
    ) {
        let (w, h) = (frame.width(), frame.height());
        match format {
            WireFormat::Uyvy => self.fill_packed8_422(frame, out.prepare_bytes(format, w, h)),
            WireFormat::Rgba => self.fill_packed8_444(frame, out.prepare_bytes(format, w, h)),
            WireFormat::P216 => self.fill_planar16_422(frame, matrix, out.prepare_words(w, h)),
        }
    }

    fn fill_packed8_422(&self, frame: &RgbaFrame<'_>, out: &mut [u8]) {
        let stride = WireFormat::Uyvy.line_stride(frame.width());
        let width = frame.width() as usize;
        self.for_each_row(out, stride, |y, row| {
            pack_uyvy_row(frame.flipped_row(y as u32), width, row);
        });
    }

    fn fill_planar16_422(&self, frame: &RgbaFrame<'_>, matrix: YuvMatrix, out: &mut [u16]) {
        let plane_width = WireFormat::P216.encoded_width(frame.width()) as usize;
        let width = frame.width() as usize;
        let (luma, chroma) = out.split_at_mut(plane_width * frame.height() as usize);

        let convert = |y: usize, (y_row, uv_row): (&mut [u16], &mut [u16])| {
            pack_p216_row(matrix, frame.flipped_row(y as u32), width, y_row, uv_row);
        };

        if self.parallel {
            luma.par_chunks_mut(plane_width)
                .zip(chroma.par_chunks_mut(plane_width))
                .enumerate()
                .for_each(|(y, rows)| convert(y, rows));
        } else {
            luma.chunks_mut(plane_width)
                .zip(chroma.chunks_mut(plane_width))
                .enumerate()
                .for_each(|(y, rows)| convert(y, rows));
        }
    }

    fn fill_packed8_444(&self, frame: &RgbaFrame<'_>, out: &mut [u8]) {
        let stride = WireFormat::Rgba.line_stride(frame.width());
        self.for_each_row(out, stride, |y, row| {
            for (dst, &src) in row.iter_mut().zip(frame.flipped_row(y as u32)) {
                *dst = quantize8(clamp01(src));
            }
        });
    }

    fn for_each_row<T, F>(&self, out: &mut [T], stride: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync,
    {
        if self.parallel {
            out.par_chunks_mut(stride)
                .enumerate()
                .for_each(|(y, row)| f(y, row));
        } else {
            out.chunks_mut(stride)
                .enumerate()
                .for_each(|(y, row)| f(y, row));
        }
    }
}

fn check_len(format: WireFormat, frame: &RgbaFrame<'_>, len: usize) -> Result<()> {
    let needed = format.sample_count(frame.width(), frame.height());
    if len != needed {
        return Err(FramecastError::ConversionFailed(format!(
            "{} output holds {} samples, {}x{} needs {}",
            format.fourcc_str(),
            len,
            frame.width(),
            frame.height(),
            needed
        )));
    }
    Ok(())
}

/// Source pixels of pair `pair`; the right pixel repeats the left one past the edge.
#[inline]
fn pair_pixels(src: &[f32], width: usize, pair: usize) -> (&[f32], &[f32]) {
    let x0 = pair * 2;
    let x1 = (x0 + 1).min(width - 1);
    (
        &src[x0 * RGBA_CHANNELS..(x0 + 1) * RGBA_CHANNELS],
        &src[x1 * RGBA_CHANNELS..(x1 + 1) * RGBA_CHANNELS],
    )
}

fn pack_uyvy_row(src: &[f32], width: usize, dst: &mut [u8]) {
    for (pair, out) in dst.chunks_exact_mut(4).enumerate() {
        let (p0, p1) = pair_pixels(src, width, pair);
        out.copy_from_slice(&encode_pair8(YuvMatrix::Rec709, p0, p1));
    }
}

fn pack_p216_row(
    matrix: YuvMatrix,
    src: &[f32],
    width: usize,
    y_row: &mut [u16],
    uv_row: &mut [u16],
) {
    for (pair, (y_out, uv_out)) in y_row
        .chunks_exact_mut(2)
        .zip(uv_row.chunks_exact_mut(2))
        .enumerate()
    {
        let (p0, p1) = pair_pixels(src, width, pair);
        let (luma, chroma) = encode_pair16(matrix, p0, p1);
        y_out.copy_from_slice(&luma);
        uv_out.copy_from_slice(&chroma);
    }
}

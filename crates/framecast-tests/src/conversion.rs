//! CPU conversion scenarios on full-size frames.

use framecast_color::YuvMatrix;
use framecast_convert::{ConversionDispatcher, ConversionRequest, CpuBackend, FormatConverter};
use framecast_core::{color_bars, solid_pixels, RgbaFrame, WireFormat};

#[test]
fn white_1080p_packs_to_full_luma() {
    let pixels = solid_pixels(1920, 1080, [1.0, 1.0, 1.0, 1.0]);
    let frame = RgbaFrame::new(&pixels, 1920, 1080).unwrap();
    let out = FormatConverter::new().to_packed8_422(&frame);

    assert_eq!(out.len(), 1920 * 1080 * 2);
    for quad in out.chunks_exact(4) {
        assert_eq!(quad[1], 255);
        assert_eq!(quad[3], 255);
        assert_eq!(quad[0], 127);
        assert_eq!(quad[2], 127);
    }
}

#[test]
fn mid_gray_sits_at_center() {
    let pixels = solid_pixels(64, 32, [0.5, 0.5, 0.5, 1.0]);
    let frame = RgbaFrame::new(&pixels, 64, 32).unwrap();
    let out = FormatConverter::new().to_packed8_422(&frame);
    assert!(out.iter().all(|&b| (126..=128).contains(&b)));
}

#[test]
fn black_rgba_is_all_zero() {
    let pixels = solid_pixels(1280, 720, [0.0; 4]);
    let frame = RgbaFrame::new(&pixels, 1280, 720).unwrap();
    let out = FormatConverter::new().to_packed8_444(&frame);
    assert_eq!(out.len(), 1280 * 720 * 4);
    assert!(out.iter().all(|&b| b == 0));
}

#[test]
fn bottom_row_lands_last() {
    let (w, h) = (16u32, 9u32);
    let mut pixels = solid_pixels(w, h, [0.0, 0.0, 0.0, 1.0]);
    // Row 0 is the bottom of the picture.
    for px in pixels[..(w * 4) as usize].chunks_exact_mut(4) {
        px.copy_from_slice(&[1.0, 0.0, 0.0, 1.0]);
    }
    let frame = RgbaFrame::new(&pixels, w, h).unwrap();
    let out = FormatConverter::new().to_packed8_444(&frame);

    let stride = (w * 4) as usize;
    let last = &out[stride * (h as usize - 1)..];
    assert!(last.chunks_exact(4).all(|px| px == [255, 0, 0, 255]));
    assert!(out[..stride].chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
}

#[test]
fn p216_white_is_limited_range() {
    let pixels = solid_pixels(3840, 2160, [1.0; 4]);
    let frame = RgbaFrame::new(&pixels, 3840, 2160).unwrap();
    let out = FormatConverter::new().to_planar16_422(&frame, YuvMatrix::Rec2020);

    let plane = 3840 * 2160;
    assert_eq!(out.len(), plane * 2);
    let (luma, chroma) = out.split_at(plane);
    assert!(luma.iter().all(|&y| y.abs_diff(60160) <= 1));
    assert!(chroma.iter().all(|&c| c.abs_diff(32768) <= 1));
}

#[test]
fn output_sizes_per_format() {
    let dispatcher = ConversionDispatcher::cpu_only(CpuBackend::new());
    let pixels = color_bars(1921, 3);
    let frame = RgbaFrame::new(&pixels, 1921, 3).unwrap();

    let uyvy = dispatcher.convert(&frame, ConversionRequest::UYVY).unwrap();
    assert_eq!(uyvy.as_bytes().len(), 1922 * 3 * 2);
    assert_eq!(uyvy.line_stride(), 1922 * 2);

    let p216 = dispatcher
        .convert(&frame, ConversionRequest::p216(YuvMatrix::Rec709))
        .unwrap();
    assert_eq!(p216.format, WireFormat::P216);
    assert_eq!(p216.as_bytes().len(), 1922 * 3 * 4);

    let rgba = dispatcher.convert(&frame, ConversionRequest::RGBA).unwrap();
    assert_eq!(rgba.as_bytes().len(), 1921 * 3 * 4);
}

#[test]
fn parallel_matches_sequential_on_color_bars() {
    let pixels = color_bars(1920, 1080);
    let frame = RgbaFrame::new(&pixels, 1920, 1080).unwrap();
    let seq = FormatConverter::new();
    let par = FormatConverter::with_parallel(true);

    assert_eq!(seq.to_packed8_422(&frame), par.to_packed8_422(&frame));
    assert_eq!(
        seq.to_planar16_422(&frame, YuvMatrix::Rec2020),
        par.to_planar16_422(&frame, YuvMatrix::Rec2020)
    );
}

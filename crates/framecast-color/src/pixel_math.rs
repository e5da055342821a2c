//! RGB to YUV matrices and quantization.
//!
//! Everything here is pure and evaluated in `f32`, left to right, so the CPU
//! path is reproducible bit for bit. Quantization truncates; it never rounds.

use framecast_core::ColorSpace;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Lowest code of the 16-bit limited range.
pub const LIMITED16_FOOT: f32 = 4096.0;
/// Luma code span of the 16-bit limited range (4096..=60160).
pub const LIMITED16_LUMA_SPAN: f32 = 56064.0;
/// Chroma midpoint of the 16-bit limited range.
pub const LIMITED16_CHROMA_MID: f32 = 32768.0;
/// Chroma scale of the 16-bit limited range (4096..=61440 over [-1, 1]).
pub const LIMITED16_CHROMA_SCALE: f32 = 28672.0;

/// Luma and color-difference weights of one YUV matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixCoefficients {
    pub luma: Vec3,
    pub chroma_u: Vec3,
    pub chroma_v: Vec3,
}

/// Supported RGB to YUV matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum YuvMatrix {
    #[default]
    Rec709,
    Rec2020,
}

impl YuvMatrix {
    pub const fn coefficients(self) -> MatrixCoefficients {
        match self {
            Self::Rec709 => MatrixCoefficients {
                luma: Vec3::new(0.2126, 0.7152, 0.0722),
                chroma_u: Vec3::new(-0.1146, -0.3854, 0.5),
                chroma_v: Vec3::new(0.5, -0.4542, -0.0458),
            },
            Self::Rec2020 => MatrixCoefficients {
                luma: Vec3::new(0.2627, 0.6780, 0.0593),
                chroma_u: Vec3::new(-0.1396, -0.3604, 0.5),
                chroma_v: Vec3::new(0.5, -0.4598, -0.0402),
            },
        }
    }

    /// Matrix used for the 16-bit path of a given color space.
    ///
    /// P3 has no broadcast YUV matrix of its own and rides in a Rec. 2020 container.
    pub fn for_color_space(space: ColorSpace) -> Self {
        match space {
            ColorSpace::Rec709 => Self::Rec709,
            ColorSpace::Rec2020 | ColorSpace::P3 => Self::Rec2020,
        }
    }

    #[inline]
    pub fn luma(self, rgb: Vec3) -> f32 {
        weigh(self.coefficients().luma, rgb)
    }

    #[inline]
    pub fn chroma_u(self, rgb: Vec3) -> f32 {
        weigh(self.coefficients().chroma_u, rgb)
    }

    #[inline]
    pub fn chroma_v(self, rgb: Vec3) -> f32 {
        weigh(self.coefficients().chroma_v, rgb)
    }
}

// Written out instead of Vec3::dot to pin the evaluation order.
#[inline]
fn weigh(w: Vec3, rgb: Vec3) -> f32 {
    w.x * rgb.x + w.y * rgb.y + w.z * rgb.z
}

/// Rec. 709 luma.
#[inline]
pub fn to_luma_709(r: f32, g: f32, b: f32) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

/// Rec. 2020 luma.
#[inline]
pub fn to_luma_2020(r: f32, g: f32, b: f32) -> f32 {
    0.2627 * r + 0.6780 * g + 0.0593 * b
}

/// Clamp to [0, 1]. NaN maps to 0.
#[inline]
pub fn clamp01(x: f32) -> f32 {
    x.max(0.0).min(1.0)
}

/// 8-bit code for a value already in [0, 1].
#[inline]
pub fn quantize8(x: f32) -> u8 {
    (x * 255.0).floor() as u8
}

/// 8-bit code for a color difference centered on zero.
#[inline]
pub fn quantize_chroma8(c: f32) -> u8 {
    quantize8(clamp01(c + 0.5))
}

/// 16-bit limited-range luma code, 4096..=60160.
#[inline]
pub fn quantize16_limited(y: f32) -> u16 {
    (LIMITED16_FOOT + clamp01(y) * LIMITED16_LUMA_SPAN) as u16
}

/// 16-bit limited-range chroma code, 4096..=61440.
#[inline]
pub fn quantize_chroma16_limited(c: f32) -> u16 {
    (LIMITED16_CHROMA_MID + c.max(-1.0).min(1.0) * LIMITED16_CHROMA_SCALE) as u16
}

#[inline]
fn rgb(pixel: &[f32]) -> Vec3 {
    Vec3::new(pixel[0], pixel[1], pixel[2])
}

/// Encode one pixel pair as 8-bit `[U, Y0, V, Y1]`.
///
/// Chroma is taken from the mean of the two pixels. Pass the same pixel twice
/// to duplicate a lone trailing column.
#[inline]
pub fn encode_pair8(matrix: YuvMatrix, p0: &[f32], p1: &[f32]) -> [u8; 4] {
    let (c0, c1) = (rgb(p0), rgb(p1));
    let mean = (c0 + c1) * 0.5;
    [
        quantize_chroma8(matrix.chroma_u(mean)),
        quantize8(clamp01(matrix.luma(c0))),
        quantize_chroma8(matrix.chroma_v(mean)),
        quantize8(clamp01(matrix.luma(c1))),
    ]
}

/// Encode one pixel pair as 16-bit limited range: `([Y0, Y1], [U, V])`.
#[inline]
pub fn encode_pair16(matrix: YuvMatrix, p0: &[f32], p1: &[f32]) -> ([u16; 2], [u16; 2]) {
    let (c0, c1) = (rgb(p0), rgb(p1));
    let mean = (c0 + c1) * 0.5;
    (
        [
            quantize16_limited(matrix.luma(c0)),
            quantize16_limited(matrix.luma(c1)),
        ],
        [
            quantize_chroma16_limited(matrix.chroma_u(mean)),
            quantize_chroma16_limited(matrix.chroma_v(mean)),
        ],
    )
}

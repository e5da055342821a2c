//! Framecast Color - pixel math and HDR color metadata.

pub mod metadata;
pub mod pixel_math;

pub use metadata::{ColorInfoTag, HdrMetadata};
pub use pixel_math::{
    clamp01, encode_pair16, encode_pair8, quantize16_limited, quantize8, quantize_chroma16_limited,
    quantize_chroma8, to_luma_2020, to_luma_709, MatrixCoefficients, YuvMatrix,
};

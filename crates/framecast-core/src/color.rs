//! Output color configuration: primaries and transfer function.

use serde::{Deserialize, Serialize};

/// Color primaries of the outgoing stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ColorSpace {
    /// Rec. 709 (HD video)
    #[default]
    Rec709,
    /// Rec. 2020 (HDR / wide gamut)
    Rec2020,
    /// DCI/Display P3, carried in a Rec. 2020 container
    P3,
}

impl ColorSpace {
    /// Primaries identifier used in stream metadata.
    pub fn primaries_tag(self) -> &'static str {
        match self {
            Self::Rec709 => "bt_709",
            Self::Rec2020 | Self::P3 => "bt_2020",
        }
    }
}

/// Transfer function the host has already baked into the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TransferFunction {
    /// Standard dynamic range (BT.709 / BT.1886)
    #[default]
    Sdr,
    /// PQ (Perceptual Quantizer, SMPTE ST 2084)
    Pq,
    /// HLG (Hybrid Log-Gamma, ARIB STD-B67)
    Hlg,
}

impl TransferFunction {
    /// Transfer identifier used in stream metadata.
    pub fn transfer_tag(self) -> &'static str {
        match self {
            Self::Sdr => "bt_709",
            Self::Pq => "bt_2100_pq",
            Self::Hlg => "bt_2100_hlg",
        }
    }

    pub fn is_hdr(self) -> bool {
        matches!(self, Self::Pq | Self::Hlg)
    }
}

/// Combined primaries and transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ColorConfig {
    pub space: ColorSpace,
    pub transfer: TransferFunction,
}

impl ColorConfig {
    pub const fn new(space: ColorSpace, transfer: TransferFunction) -> Self {
        Self { space, transfer }
    }

    /// Rec. 709 SDR.
    pub const REC709: Self = Self::new(ColorSpace::Rec709, TransferFunction::Sdr);

    /// Rec. 2020 PQ (HDR10-style).
    pub const REC2020_PQ: Self = Self::new(ColorSpace::Rec2020, TransferFunction::Pq);
}

//! HDR color metadata attached to outgoing frames.

use framecast_core::{ColorConfig, OutputConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static HDR light-level metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HdrMetadata {
    /// Maximum Content Light Level in nits.
    pub max_content_light_level: u32,
    /// Maximum Frame Average Light Level in nits.
    pub max_frame_avg_light_level: u32,
}

impl Default for HdrMetadata {
    fn default() -> Self {
        Self {
            max_content_light_level: 1000,
            max_frame_avg_light_level: 400,
        }
    }
}

impl HdrMetadata {
    /// Light levels from the output settings, truncated to whole nits.
    pub fn from_config(config: &OutputConfig) -> Self {
        Self {
            max_content_light_level: config.max_cll.max(0.0) as u32,
            max_frame_avg_light_level: config.max_fall.max(0.0) as u32,
        }
    }
}

/// The `<ndi_color_info .../>` tag sent alongside HDR frames.
///
/// The matrix attribute always mirrors the primaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorInfoTag {
    pub color: ColorConfig,
    pub light_levels: Option<HdrMetadata>,
}

impl ColorInfoTag {
    pub fn new(color: ColorConfig) -> Self {
        Self {
            color,
            light_levels: None,
        }
    }

    pub fn with_light_levels(mut self, levels: HdrMetadata) -> Self {
        self.light_levels = Some(levels);
        self
    }

    /// Tag for an HDR send, or `None` when the stream is SDR.
    pub fn for_output(config: &OutputConfig) -> Option<Self> {
        if !config.hdr_enabled {
            return None;
        }
        let tag = Self::new(config.color());
        Some(if config.embed_light_levels {
            tag.with_light_levels(HdrMetadata::from_config(config))
        } else {
            tag
        })
    }
}

impl fmt::Display for ColorInfoTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let primaries = self.color.space.primaries_tag();
        write!(
            f,
            "<ndi_color_info transfer=\"{}\" matrix=\"{}\" primaries=\"{}\"",
            self.color.transfer.transfer_tag(),
            primaries,
            primaries
        )?;
        if let Some(levels) = self.light_levels {
            write!(
                f,
                " max_cll=\"{}\" max_fall=\"{}\"",
                levels.max_content_light_level, levels.max_frame_avg_light_level
            )?;
        }
        f.write_str("/>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_core::{ColorSpace, TransferFunction};

    #[test]
    fn pq_rec2020_tag() {
        let tag = ColorInfoTag::new(ColorConfig::REC2020_PQ);
        assert_eq!(
            tag.to_string(),
            r#"<ndi_color_info transfer="bt_2100_pq" matrix="bt_2020" primaries="bt_2020"/>"#
        );
    }

    #[test]
    fn hlg_p3_uses_bt2020_container() {
        let tag = ColorInfoTag::new(ColorConfig::new(ColorSpace::P3, TransferFunction::Hlg));
        assert_eq!(
            tag.to_string(),
            r#"<ndi_color_info transfer="bt_2100_hlg" matrix="bt_2020" primaries="bt_2020"/>"#
        );
    }

    #[test]
    fn light_levels_are_appended() {
        let tag = ColorInfoTag::new(ColorConfig::REC2020_PQ).with_light_levels(HdrMetadata {
            max_content_light_level: 1000,
            max_frame_avg_light_level: 400,
        });
        assert!(tag
            .to_string()
            .ends_with(r#" max_cll="1000" max_fall="400"/>"#));
    }

    #[test]
    fn sdr_output_has_no_tag() {
        assert!(ColorInfoTag::for_output(&OutputConfig::default()).is_none());
    }

    #[test]
    fn light_levels_follow_config_flag() {
        let mut config = OutputConfig {
            hdr_enabled: true,
            color_space: ColorSpace::Rec2020,
            transfer_function: TransferFunction::Pq,
            max_cll: 1500.7,
            ..Default::default()
        };
        let tag = ColorInfoTag::for_output(&config).unwrap();
        assert!(tag.light_levels.is_none());

        config.embed_light_levels = true;
        let tag = ColorInfoTag::for_output(&config).unwrap();
        assert_eq!(tag.light_levels.unwrap().max_content_light_level, 1500);
    }
}

//! Per-stream output configuration.

use crate::color::{ColorConfig, ColorSpace, TransferFunction};
use crate::error::{FramecastError, Result};
use crate::frame::WireFormat;
use crate::time::FrameRate;
use serde::{Deserialize, Serialize};

/// What happens when a bounded send queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OverflowPolicy {
    /// Discard the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Refuse the new frame.
    Reject,
}

/// Settings the host supplies with every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Name the sender advertises on the network.
    pub source_name: String,
    pub enabled: bool,
    pub hdr_enabled: bool,
    pub gpu_acceleration: bool,
    pub async_sending: bool,
    /// SDR only: send 8-bit 4:2:2 instead of 8-bit RGBA.
    pub optimal_format: bool,
    pub frame_rate: f64,
    pub color_space: ColorSpace,
    pub transfer_function: TransferFunction,
    /// Maximum content light level, nits.
    pub max_cll: f32,
    /// Maximum frame-average light level, nits.
    pub max_fall: f32,
    /// Attach max_cll/max_fall to the HDR color tag.
    pub embed_light_levels: bool,
    /// Bound on queued frames when sending asynchronously. `None` is unbounded.
    pub queue_depth: Option<usize>,
    pub queue_overflow: OverflowPolicy,
    /// Device-operation timeout before a GPU conversion counts as failed.
    pub gpu_timeout_ms: u64,
    /// Convert rows in parallel on the CPU path.
    pub parallel_cpu: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            source_name: "Framecast Output".to_string(),
            enabled: false,
            hdr_enabled: false,
            gpu_acceleration: true,
            async_sending: false,
            optimal_format: true,
            frame_rate: 25.0,
            color_space: ColorSpace::Rec709,
            transfer_function: TransferFunction::Sdr,
            max_cll: 1000.0,
            max_fall: 400.0,
            embed_light_levels: false,
            queue_depth: None,
            queue_overflow: OverflowPolicy::DropOldest,
            gpu_timeout_ms: 2000,
            parallel_cpu: false,
        }
    }
}

impl OutputConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(1.0..=120.0).contains(&self.frame_rate) {
            return Err(FramecastError::InvalidConfig(format!(
                "frame rate {} outside 1-120",
                self.frame_rate
            )));
        }
        if self.max_cll < 0.0 || self.max_fall < 0.0 {
            return Err(FramecastError::InvalidConfig(
                "light levels must be non-negative".to_string(),
            ));
        }
        if self.queue_depth == Some(0) {
            return Err(FramecastError::InvalidConfig(
                "queue depth must be at least 1".to_string(),
            ));
        }
        if self.source_name.trim().is_empty() {
            return Err(FramecastError::InvalidConfig(
                "source name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Wire layout selected by this configuration.
    pub fn wire_format(&self) -> WireFormat {
        if self.hdr_enabled {
            WireFormat::P216
        } else if self.optimal_format {
            WireFormat::Uyvy
        } else {
            WireFormat::Rgba
        }
    }

    pub fn color(&self) -> ColorConfig {
        ColorConfig::new(self.color_space, self.transfer_function)
    }

    pub fn rate(&self) -> FrameRate {
        FrameRate::from_fps_f64(self.frame_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        OutputConfig::default().validate().unwrap();
    }

    #[test]
    fn wire_format_selection() {
        let mut config = OutputConfig::default();
        assert_eq!(config.wire_format(), WireFormat::Uyvy);

        config.optimal_format = false;
        assert_eq!(config.wire_format(), WireFormat::Rgba);

        config.hdr_enabled = true;
        assert_eq!(config.wire_format(), WireFormat::P216);
    }

    #[test]
    fn rejects_out_of_range_frame_rate() {
        let config = OutputConfig {
            frame_rate: 240.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FramecastError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_zero_queue_depth() {
        let config = OutputConfig {
            queue_depth: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = OutputConfig::from_json_str(
            r#"{ "enabled": true, "hdr_enabled": true, "color_space": "Rec2020", "transfer_function": "Pq" }"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.color(), ColorConfig::REC2020_PQ);
        assert_eq!(config.frame_rate, 25.0);
        assert_eq!(config.source_name, "Framecast Output");
    }

    #[test]
    fn malformed_json_is_serialization_error() {
        let err = OutputConfig::from_json_str("{ enabled: ").unwrap_err();
        assert!(matches!(err, FramecastError::Serialization(_)));
    }

    #[test]
    fn json_round_trip() {
        let config = OutputConfig {
            async_sending: true,
            queue_depth: Some(4),
            queue_overflow: OverflowPolicy::Reject,
            ..Default::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(OutputConfig::from_json_str(&json).unwrap(), config);
    }
}

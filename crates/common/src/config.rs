//! Configuration structs for the codec session, motion estimator, and rate control.

use serde::{Deserialize, Serialize};

use crate::control::ControlParameters;
use crate::types::Resolution;

/// Smallest quantizer index (finest quantization).
pub const MIN_QUALITY: u8 = 1;
/// Largest quantizer index (coarsest quantization).
pub const MAX_QUALITY: u8 = 31;

/// Top-level session configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name reported through the `codecname` property.
    pub codec_name: String,
    pub resolution: Resolution,
    /// Frames between periodic key frames (0 = only the first frame and forced ones).
    pub gop_length: u32,
    /// Average motion distortion above which an inter frame is promoted to a
    /// key frame (0 = disabled).
    pub scene_change_distortion: u64,
    pub estimator: EstimatorConfig,
    pub rate: RateConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            codec_name: "rtv-ref".to_string(),
            resolution: Resolution::CIF,
            gop_length: 0,
            scene_change_distortion: 0,
            estimator: EstimatorConfig::default(),
            rate: RateConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }

    /// Initial control parameters derived from the rate section.
    pub fn initial_controls(&self) -> ControlParameters {
        ControlParameters::new(self.rate.frame_bit_limit, self.rate.group_id)
    }
}

/// Motion estimator selection and geometry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Registry name of the estimator (`full_search`, `multires_cross`).
    pub kind: String,
    /// Square block size in pixels.
    pub block_size: u32,
    /// Maximum full-pel displacement in each direction.
    pub search_range: u32,
    /// Initial mode value (0 = automatic).
    pub mode: u32,
    /// Upper bound on working memory in bytes; `create()` fails above it.
    pub memory_limit: Option<usize>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            kind: "multires_cross".to_string(),
            block_size: 16,
            search_range: 16,
            mode: 0,
            memory_limit: None,
        }
    }
}

/// Rate-control settings.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Starting quantizer index.
    pub quality: u8,
    pub min_quality: u8,
    pub max_quality: u8,
    /// Initial advisory bit budget per frame (0 = best effort).
    pub frame_bit_limit: u32,
    /// Initial stream group tag.
    pub group_id: i32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            quality: 8,
            min_quality: MIN_QUALITY,
            max_quality: MAX_QUALITY,
            frame_bit_limit: 0,
            group_id: 0,
        }
    }
}

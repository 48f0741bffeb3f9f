//! Per-request render configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PlanError;

/// Output container/codec preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputPreset {
    #[default]
    #[serde(rename = "mp4-h264")]
    Mp4H264,
    #[serde(rename = "mp4-h265")]
    Mp4H265,
    #[serde(rename = "webm")]
    Webm,
}

impl OutputPreset {
    pub fn extension(self) -> &'static str {
        match self {
            OutputPreset::Mp4H264 | OutputPreset::Mp4H265 => "mp4",
            OutputPreset::Webm => "webm",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputPreset::Mp4H264 => "mp4-h264",
            OutputPreset::Mp4H265 => "mp4-h265",
            OutputPreset::Webm => "webm",
        }
    }
}

impl FromStr for OutputPreset {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4-h264" | "mp4" | "h264" => Ok(OutputPreset::Mp4H264),
            "mp4-h265" | "h265" | "hevc" => Ok(OutputPreset::Mp4H265),
            "webm" | "vp9" => Ok(OutputPreset::Webm),
            other => Err(PlanError::InvalidConfig(format!(
                "unknown output preset '{other}' (use mp4-h264, mp4-h265, webm)"
            ))),
        }
    }
}

impl fmt::Display for OutputPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency/fidelity trade-off for overlays and the export time budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Opacity/position animation only, shorter export ceiling.
    Fast,
    #[default]
    Full,
}

/// Immutable render settings for one request.
///
/// Construct through [`RenderConfig::builder`]; all fields are validated once
/// and exposed read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RenderConfigBuilder", into = "RenderConfigBuilder")]
pub struct RenderConfig {
    width: u32,
    height: u32,
    fps: u32,
    premium: bool,
    bpm: f64,
    preset: OutputPreset,
    mode: RenderMode,
}

impl RenderConfig {
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder::default()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn premium(&self) -> bool {
        self.premium
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn preset(&self) -> OutputPreset {
        self.preset
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn is_fast(&self) -> bool {
        self.mode == RenderMode::Fast
    }

    /// Duration of one frame in microseconds.
    pub fn frame_interval_us(&self) -> u64 {
        1_000_000 / self.fps as u64
    }

    /// Beat period in seconds, when beat sync is enabled.
    pub fn beat_interval_secs(&self) -> Option<f64> {
        (self.bpm > 0.0).then(|| 60.0 / self.bpm)
    }
}

/// Builder and serialized form of [`RenderConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfigBuilder {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub premium: bool,
    pub bpm: f64,
    pub preset: OutputPreset,
    pub mode: RenderMode,
}

impl Default for RenderConfigBuilder {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            premium: false,
            bpm: 0.0,
            preset: OutputPreset::Mp4H264,
            mode: RenderMode::Full,
        }
    }
}

impl RenderConfigBuilder {
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn premium(mut self, premium: bool) -> Self {
        self.premium = premium;
        self
    }

    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

    pub fn preset(mut self, preset: OutputPreset) -> Self {
        self.preset = preset;
        self
    }

    pub fn mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<RenderConfig, PlanError> {
        if self.width == 0 || self.height == 0 {
            return Err(PlanError::InvalidConfig(
                "output dimensions must be non-zero".to_string(),
            ));
        }
        // yuv420p needs even dimensions.
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(PlanError::InvalidConfig(format!(
                "output dimensions must be even, got {}x{}",
                self.width, self.height
            )));
        }
        if !(1..=120).contains(&self.fps) {
            return Err(PlanError::InvalidConfig(format!(
                "frame rate {} outside 1..=120",
                self.fps
            )));
        }
        if !self.bpm.is_finite() || self.bpm < 0.0 || self.bpm > 300.0 {
            return Err(PlanError::InvalidConfig(format!(
                "bpm {} outside 0..=300",
                self.bpm
            )));
        }
        Ok(RenderConfig {
            width: self.width,
            height: self.height,
            fps: self.fps,
            premium: self.premium,
            bpm: self.bpm,
            preset: self.preset,
            mode: self.mode,
        })
    }
}

impl TryFrom<RenderConfigBuilder> for RenderConfig {
    type Error = PlanError;

    fn try_from(builder: RenderConfigBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl From<RenderConfig> for RenderConfigBuilder {
    fn from(config: RenderConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
            premium: config.premium,
            bpm: config.bpm,
            preset: config.preset,
            mode: config.mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_vertical_1080p() {
        let config = RenderConfig::builder().build().unwrap();
        assert_eq!((config.width(), config.height()), (1080, 1920));
        assert_eq!(config.fps(), 30);
        assert_eq!(config.frame_interval_us(), 33_333);
        assert_eq!(config.beat_interval_secs(), None);
    }

    #[test]
    fn test_rejects_odd_dimensions_and_bad_fps() {
        assert!(RenderConfig::builder().size(1081, 1920).build().is_err());
        assert!(RenderConfig::builder().size(0, 1920).build().is_err());
        assert!(RenderConfig::builder().fps(0).build().is_err());
        assert!(RenderConfig::builder().bpm(-1.0).build().is_err());
    }

    #[test]
    fn test_beat_interval() {
        let config = RenderConfig::builder().bpm(120.0).build().unwrap();
        assert_eq!(config.beat_interval_secs(), Some(0.5));
    }

    #[test]
    fn test_deserialize_validates() {
        let config: RenderConfig =
            serde_json::from_str(r#"{ "width": 720, "height": 1280, "mode": "fast" }"#).unwrap();
        assert!(config.is_fast());
        assert_eq!(config.preset(), OutputPreset::Mp4H264);
        assert!(serde_json::from_str::<RenderConfig>(r#"{ "fps": 500 }"#).is_err());
    }

    #[test]
    fn test_preset_parsing() {
        assert_eq!("hevc".parse::<OutputPreset>().unwrap(), OutputPreset::Mp4H265);
        assert_eq!(OutputPreset::Webm.extension(), "webm");
        assert!("avi".parse::<OutputPreset>().is_err());
    }
}

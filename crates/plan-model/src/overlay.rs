//! Timed overlay descriptors.
//!
//! An overlay never changes the timeline length. It only says *what* to draw
//! and *when*; turning it into something an encoder can composite is the job
//! of the render engine's layer factory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::filter::Rgba;
use crate::time::{MediaTime, TimeRange};
use crate::transform::Point2D;

/// How a layer enters its window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entrance {
    /// Appears at full opacity.
    Cut,
    #[default]
    Fade,
    /// Slides up into place while fading in.
    SlideUp,
    /// Scales up from small; a continuous-scale effect.
    Pop,
}

/// Screen corner used for branding placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

/// Caption or title text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,

    /// Font size as a fraction of canvas height.
    #[serde(default = "default_text_size")]
    pub size: f64,

    #[serde(default = "default_text_color")]
    pub color: Rgba,

    /// Center of the text block in normalized canvas coordinates.
    #[serde(default)]
    pub position: Point2D,

    /// Optional filled box behind the text.
    #[serde(default)]
    pub background: Option<Rgba>,

    /// Soft drop shadow (blurred); dropped in fast mode.
    #[serde(default)]
    pub shadow: bool,

    #[serde(default)]
    pub entrance: Entrance,
}

/// An image sticker (emoji, badge, product shot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickerOverlay {
    pub image: PathBuf,

    /// Sticker width as a fraction of canvas width.
    #[serde(default = "default_sticker_scale")]
    pub scale: f64,

    #[serde(default)]
    pub position: Point2D,

    /// Continuous rotation; dropped in fast mode.
    #[serde(default)]
    pub spin: bool,

    /// Continuous breathing scale; dropped in fast mode.
    #[serde(default)]
    pub pulse: bool,

    #[serde(default)]
    pub entrance: Entrance,
}

/// App or creator watermark pinned to a corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandingOverlay {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub image: Option<PathBuf>,

    #[serde(default)]
    pub corner: Corner,

    #[serde(default = "default_branding_opacity")]
    pub opacity: f64,
}

/// What an overlay draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayContent {
    Text(TextOverlay),
    Sticker(StickerOverlay),
    Branding(BrandingOverlay),
}

/// A timed overlay descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub start: MediaTime,
    pub duration: MediaTime,
    pub content: OverlayContent,
}

impl Overlay {
    pub fn new(start: MediaTime, duration: MediaTime, content: OverlayContent) -> Self {
        Self {
            start,
            duration,
            content,
        }
    }

    /// Plain centered caption with default styling.
    pub fn caption(start_secs: f64, duration_secs: f64, text: impl Into<String>) -> Self {
        Self::new(
            MediaTime::from_secs_f64(start_secs),
            MediaTime::from_secs_f64(duration_secs),
            OverlayContent::Text(TextOverlay {
                text: text.into(),
                size: default_text_size(),
                color: default_text_color(),
                position: Point2D::new(0.5, 0.8),
                background: None,
                shadow: false,
                entrance: Entrance::Fade,
            }),
        )
    }

    /// Visibility window `[start, start + duration)`.
    pub fn window(&self) -> TimeRange {
        TimeRange::new(self.start, self.duration)
    }

    pub fn kind(&self) -> &'static str {
        match self.content {
            OverlayContent::Text(_) => "text",
            OverlayContent::Sticker(_) => "sticker",
            OverlayContent::Branding(_) => "branding",
        }
    }

    /// Image inputs this overlay needs at export time.
    pub fn image_path(&self) -> Option<&PathBuf> {
        match &self.content {
            OverlayContent::Sticker(sticker) => Some(&sticker.image),
            OverlayContent::Branding(branding) => branding.image.as_ref(),
            OverlayContent::Text(_) => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.duration.is_zero() {
            return Err("duration must be greater than zero".to_string());
        }
        match &self.content {
            OverlayContent::Text(text) => {
                if text.text.trim().is_empty() {
                    return Err("text overlay has no text".to_string());
                }
                if !(0.005..=0.5).contains(&text.size) {
                    return Err(format!("text size {} outside [0.005, 0.5]", text.size));
                }
            }
            OverlayContent::Sticker(sticker) => {
                if !(0.01..=1.0).contains(&sticker.scale) {
                    return Err(format!("sticker scale {} outside [0.01, 1]", sticker.scale));
                }
            }
            OverlayContent::Branding(branding) => {
                if branding.text.is_none() && branding.image.is_none() {
                    return Err("branding overlay needs text or an image".to_string());
                }
                if !(0.0..=1.0).contains(&branding.opacity) {
                    return Err(format!(
                        "branding opacity {} outside [0, 1]",
                        branding.opacity
                    ));
                }
            }
        }
        Ok(())
    }
}

fn default_text_size() -> f64 {
    0.045
}

fn default_text_color() -> Rgba {
    Rgba::WHITE
}

fn default_sticker_scale() -> f64 {
    0.25
}

fn default_branding_opacity() -> f64 {
    0.8
}

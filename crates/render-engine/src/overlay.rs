//! Overlay layer factory.
//!
//! Turns [`Overlay`] descriptors into concrete, pixel-placed layers for a
//! given [`RenderConfig`]. The factory is a pure function of its inputs so
//! that identical requests produce identical layers. Encoder syntax is not
//! produced here; see `graph`.

use std::path::PathBuf;

use reelsmith_plan_model::{
    Corner, Entrance, MediaTime, Overlay, OverlayContent, RenderConfig, Rgba, TimeRange,
};
use serde::Serialize;

/// Base duration of entrance/exit animations.
const ANIMATION_SECS: f64 = 0.3;
const PREMIUM_ANIMATION_SECS: f64 = 0.45;
/// Slide-up travel as a fraction of canvas height.
const SLIDE_DISTANCE: f64 = 0.04;
/// Branding inset as a fraction of the shorter canvas side.
const BRANDING_MARGIN: f64 = 0.03;
const BRANDING_TEXT_SIZE: f64 = 0.028;
const BRANDING_IMAGE_WIDTH: f64 = 0.18;
const SPIN_PERIOD_SECS: f64 = 4.0;
const PULSE_PERIOD_SECS: f64 = 1.2;
const PULSE_AMPLITUDE: f64 = 0.06;

/// Time-based behavior attached to a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum LayerEffect {
    FadeIn { secs: f64 },
    FadeOut { secs: f64 },
    /// Rises `distance_px` into place while fading in.
    SlideUp { secs: f64, distance_px: f64 },
    /// Scales up from 60% over `secs`.
    PopIn { secs: f64 },
    /// Continuous rotation, one turn per period.
    Spin { period_secs: f64 },
    /// Continuous breathing scale.
    Pulse { period_secs: f64, amplitude: f64 },
    /// Blurred text shadow.
    ShadowBlur { radius_px: u32 },
}

impl LayerEffect {
    pub fn name(&self) -> &'static str {
        match self {
            LayerEffect::FadeIn { .. } => "fade_in",
            LayerEffect::FadeOut { .. } => "fade_out",
            LayerEffect::SlideUp { .. } => "slide_up",
            LayerEffect::PopIn { .. } => "pop_in",
            LayerEffect::Spin { .. } => "spin",
            LayerEffect::Pulse { .. } => "pulse",
            LayerEffect::ShadowBlur { .. } => "shadow_blur",
        }
    }

    /// Rotation, continuous scale, or blur: not allowed in fast mode.
    pub fn is_expensive(&self) -> bool {
        matches!(
            self,
            LayerEffect::PopIn { .. }
                | LayerEffect::Spin { .. }
                | LayerEffect::Pulse { .. }
                | LayerEffect::ShadowBlur { .. }
        )
    }
}

/// Where a layer sits on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "anchor", rename_all = "snake_case")]
pub enum Anchor {
    /// Layer centered on a pixel position.
    Center { x: f64, y: f64 },
    /// Layer pinned into a corner with an inset.
    Corner { corner: Corner, margin_px: u32 },
}

/// What a layer draws.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerContent {
    Text {
        text: String,
        font_px: u32,
        color: Rgba,
        background: Option<Rgba>,
        /// Hard drop-shadow offset; cheap, kept in every mode.
        shadow_offset_px: Option<u32>,
    },
    Image {
        path: PathBuf,
        width_px: u32,
        opacity: f64,
    },
}

/// A renderable overlay, visible only within `window`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLayer {
    /// Descriptor index in the plan.
    pub index: usize,
    pub kind: &'static str,
    pub window: TimeRange,
    /// Stacking order; higher draws on top.
    pub z_index: usize,
    pub anchor: Anchor,
    pub content: LayerContent,
    pub effects: Vec<LayerEffect>,
    /// Effects requested by the descriptor but not allowed in this mode.
    pub dropped_effects: Vec<&'static str>,
}

impl OverlayLayer {
    /// Whether the layer is present at `t` (half-open window).
    pub fn is_visible_at(&self, t: MediaTime) -> bool {
        self.window.contains(t)
    }

    /// Opacity at `t` from fade effects; zero outside the window.
    pub fn opacity_at(&self, t: MediaTime) -> f64 {
        if !self.is_visible_at(t) {
            return 0.0;
        }
        let since = (t - self.window.start).as_secs_f64();
        let until = (self.window.end() - t).as_secs_f64();
        let mut opacity: f64 = 1.0;
        for effect in &self.effects {
            match *effect {
                LayerEffect::FadeIn { secs } | LayerEffect::SlideUp { secs, .. } if secs > 0.0 => {
                    opacity = opacity.min(since / secs);
                }
                LayerEffect::FadeOut { secs } if secs > 0.0 => {
                    opacity = opacity.min(until / secs);
                }
                _ => {}
            }
        }
        opacity.clamp(0.0, 1.0)
    }

    pub fn has_effect(&self, name: &str) -> bool {
        self.effects.iter().any(|e| e.name() == name)
    }

    pub fn image_path(&self) -> Option<&PathBuf> {
        match &self.content {
            LayerContent::Image { path, .. } => Some(path),
            LayerContent::Text { .. } => None,
        }
    }
}

/// Builds [`OverlayLayer`]s for one render configuration.
pub struct OverlayLayerFactory<'a> {
    config: &'a RenderConfig,
}

impl<'a> OverlayLayerFactory<'a> {
    pub fn new(config: &'a RenderConfig) -> Self {
        Self { config }
    }

    /// Build every layer in descriptor order, clipped to the timeline.
    pub fn build_all(&self, overlays: &[Overlay], timeline: MediaTime) -> Vec<OverlayLayer> {
        overlays
            .iter()
            .enumerate()
            .map(|(index, overlay)| self.build(index, overlay, timeline))
            .collect()
    }

    /// Build the layer for descriptor `index`.
    pub fn build(&self, index: usize, overlay: &Overlay, timeline: MediaTime) -> OverlayLayer {
        let end = overlay.window().end().min(timeline);
        let window = TimeRange::new(overlay.start, end.saturating_sub(overlay.start));
        let anim = self.animation_secs(window);

        let mut requested = Vec::new();
        let (anchor, content) = match &overlay.content {
            OverlayContent::Text(text) => {
                let font_px = ((text.size * self.config.height() as f64).round() as u32).max(1);
                requested.extend(entrance_effects(text.entrance, anim, self.slide_px()));
                if text.shadow {
                    requested.push(LayerEffect::ShadowBlur {
                        radius_px: (font_px / 12).max(2),
                    });
                }
                (
                    self.center(text.position.x, text.position.y),
                    LayerContent::Text {
                        text: text.text.clone(),
                        font_px,
                        color: text.color,
                        background: text.background,
                        shadow_offset_px: text.shadow.then_some((font_px / 20).max(2)),
                    },
                )
            }
            OverlayContent::Sticker(sticker) => {
                let width_px = even_px(sticker.scale * self.config.width() as f64);
                requested.extend(entrance_effects(sticker.entrance, anim, self.slide_px()));
                if sticker.spin {
                    requested.push(LayerEffect::Spin {
                        period_secs: SPIN_PERIOD_SECS,
                    });
                }
                if sticker.pulse {
                    requested.push(LayerEffect::Pulse {
                        period_secs: self.pulse_period(),
                        amplitude: PULSE_AMPLITUDE,
                    });
                }
                (
                    self.center(sticker.position.x, sticker.position.y),
                    LayerContent::Image {
                        path: sticker.image.clone(),
                        width_px,
                        opacity: 1.0,
                    },
                )
            }
            OverlayContent::Branding(branding) => {
                let short_side = self.config.width().min(self.config.height()) as f64;
                let anchor = Anchor::Corner {
                    corner: branding.corner,
                    margin_px: (short_side * BRANDING_MARGIN).round() as u32,
                };
                requested.push(LayerEffect::FadeIn { secs: anim });
                let content = match (&branding.image, &branding.text) {
                    (Some(image), _) => LayerContent::Image {
                        path: image.clone(),
                        width_px: even_px(BRANDING_IMAGE_WIDTH * self.config.width() as f64),
                        opacity: branding.opacity,
                    },
                    (None, text) => LayerContent::Text {
                        text: text.clone().unwrap_or_default(),
                        font_px: ((BRANDING_TEXT_SIZE * self.config.height() as f64).round()
                            as u32)
                            .max(1),
                        color: Rgba::rgba(255, 255, 255, (branding.opacity * 255.0).round() as u8),
                        background: None,
                        shadow_offset_px: None,
                    },
                };
                (anchor, content)
            }
        };

        let (effects, dropped_effects) = self.apply_mode(requested, anim);
        if !dropped_effects.is_empty() {
            tracing::info!(
                overlay = index,
                kind = overlay.kind(),
                dropped = ?dropped_effects,
                "Fast mode dropped overlay effects"
            );
        }

        OverlayLayer {
            index,
            kind: overlay.kind(),
            window,
            z_index: index,
            anchor,
            content,
            effects,
            dropped_effects,
        }
    }

    /// In fast mode strip expensive effects; a dropped pop entrance falls
    /// back to a fade so the layer still eases in.
    fn apply_mode(
        &self,
        requested: Vec<LayerEffect>,
        anim: f64,
    ) -> (Vec<LayerEffect>, Vec<&'static str>) {
        if !self.config.is_fast() {
            return (requested, Vec::new());
        }
        let mut kept = Vec::with_capacity(requested.len());
        let mut dropped = Vec::new();
        for effect in requested {
            if effect.is_expensive() {
                dropped.push(effect.name());
                if matches!(effect, LayerEffect::PopIn { .. }) {
                    kept.push(LayerEffect::FadeIn { secs: anim });
                }
            } else {
                kept.push(effect);
            }
        }
        (kept, dropped)
    }

    fn animation_secs(&self, window: TimeRange) -> f64 {
        let base = if self.config.premium() {
            PREMIUM_ANIMATION_SECS
        } else {
            ANIMATION_SECS
        };
        base.min(window.duration.as_secs_f64() / 3.0)
    }

    fn pulse_period(&self) -> f64 {
        match self.config.beat_interval_secs() {
            Some(beat) if self.config.premium() => beat,
            _ => PULSE_PERIOD_SECS,
        }
    }

    fn slide_px(&self) -> f64 {
        (SLIDE_DISTANCE * self.config.height() as f64).round()
    }

    fn center(&self, x: f64, y: f64) -> Anchor {
        Anchor::Center {
            x: x * self.config.width() as f64,
            y: y * self.config.height() as f64,
        }
    }
}

fn entrance_effects(entrance: Entrance, secs: f64, slide_px: f64) -> Vec<LayerEffect> {
    match entrance {
        Entrance::Cut => Vec::new(),
        Entrance::Fade => vec![LayerEffect::FadeIn { secs }, LayerEffect::FadeOut { secs }],
        Entrance::SlideUp => vec![
            LayerEffect::SlideUp {
                secs,
                distance_px: slide_px,
            },
            LayerEffect::FadeOut { secs },
        ],
        Entrance::Pop => vec![LayerEffect::PopIn { secs }, LayerEffect::FadeOut { secs }],
    }
}

fn even_px(v: f64) -> u32 {
    let v = v.round().max(2.0) as u32;
    v - v % 2
}

//! Frame compositor: which segment and which overlay layers each frame shows.
//!
//! This mirrors the decisions the export graph makes, frame by frame, without
//! touching pixels. It backs post-export verification reports and lets two
//! renders be compared for identical layer timing.

use reelsmith_common::clock::{frame_interval_us, frames_for};
use reelsmith_plan_model::{MediaTime, TimeRange};
use serde::Serialize;

use crate::assembler::Composition;
use crate::overlay::OverlayLayer;

/// A single frame's composition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameComposition {
    /// Frame number.
    pub frame_index: u64,

    /// Time in seconds.
    pub time_secs: f64,

    /// Track item on screen, `None` past the end of the timeline.
    pub segment: Option<usize>,

    /// Whether the frame repeats a clip's last frame.
    pub holding: bool,

    /// Visible layers in stacking order (bottom first).
    pub layers: Vec<usize>,
}

/// Compute the composition of every `step`-th frame.
pub fn compute_compositions(
    composition: &Composition,
    layers: &[OverlayLayer],
    step: u64,
) -> Vec<FrameComposition> {
    let total_frames = frames_for(composition.duration.as_micros(), composition.fps);
    let frame_us = frame_interval_us(composition.fps);
    let step = step.max(1);
    let mut frames = Vec::with_capacity((total_frames / step + 1) as usize);

    let mut stacked: Vec<&OverlayLayer> = layers.iter().collect();
    stacked.sort_by_key(|layer| layer.z_index);

    for frame in (0..total_frames).step_by(step as usize) {
        let t = MediaTime::from_micros(frame * frame_us);
        let segment = composition.segment_at(t);
        let holding = segment
            .map(|s| !s.hold.is_zero() && t >= s.range.start + s.source_duration)
            .unwrap_or(false);

        frames.push(FrameComposition {
            frame_index: frame,
            time_secs: t.as_secs_f64(),
            segment: segment.map(|s| s.index),
            holding,
            layers: stacked
                .iter()
                .filter(|layer| layer.is_visible_at(t))
                .map(|layer| layer.index)
                .collect(),
        });
    }

    frames
}

/// Summary written next to a finished render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionReport {
    pub sampled_frames: usize,
    /// Frames that fell outside every segment; non-zero means a timeline gap.
    pub uncovered_frames: usize,
    pub held_frames: usize,
    pub max_concurrent_layers: usize,
    /// Each layer's visibility window, in descriptor order.
    pub overlay_windows: Vec<TimeRange>,
}

impl CompositionReport {
    pub fn build(composition: &Composition, layers: &[OverlayLayer], step: u64) -> Self {
        let frames = compute_compositions(composition, layers, step);
        Self {
            sampled_frames: frames.len(),
            uncovered_frames: frames.iter().filter(|f| f.segment.is_none()).count(),
            held_frames: frames.iter().filter(|f| f.holding).count(),
            max_concurrent_layers: frames.iter().map(|f| f.layers.len()).max().unwrap_or(0),
            overlay_windows: layers.iter().map(|l| l.window).collect(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.uncovered_frames == 0
    }
}

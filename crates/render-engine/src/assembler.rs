//! Composition assembly: ordered segments plus optional audio into one timeline.
//!
//! Nothing here re-encodes pixels. The assembler probes every segment, decides
//! how each one is placed in the canvas (a [`FitInstruction`]) and how the
//! audio is trimmed or looped, and hands the resulting [`Composition`] to the
//! exporter.

use std::path::PathBuf;

use reelsmith_common::clock::within_one_frame;
use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_plan_model::{AudioSource, MediaTime, RenderConfig, TimeRange};

use crate::encoder::MediaEncoder;
use crate::segment::SegmentRef;

/// Aspect-preserving placement of a source inside the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitInstruction {
    pub scale: f64,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl FitInstruction {
    /// Whether the source already covers the whole canvas unscaled.
    pub fn is_identity(&self, canvas_width: u32, canvas_height: u32) -> bool {
        self.offset_x == 0
            && self.offset_y == 0
            && self.scaled_width == canvas_width
            && self.scaled_height == canvas_height
    }
}

/// Fit a `src_w x src_h` source into the canvas: preserve ratio, center, never crop.
///
/// Scaled dimensions are rounded down to even values for 4:2:0 output.
pub fn aspect_fit(src_w: u32, src_h: u32, canvas_w: u32, canvas_h: u32) -> FitInstruction {
    let src_w = src_w.max(1);
    let src_h = src_h.max(1);
    let scale = (canvas_w as f64 / src_w as f64).min(canvas_h as f64 / src_h as f64);

    let even = |v: f64, limit: u32| -> u32 {
        let v = (v.round() as u32).min(limit);
        (v - v % 2).max(2.min(limit))
    };
    let scaled_width = even(src_w as f64 * scale, canvas_w);
    let scaled_height = even(src_h as f64 * scale, canvas_h);

    FitInstruction {
        scale,
        scaled_width,
        scaled_height,
        offset_x: (canvas_w - scaled_width) / 2,
        offset_y: (canvas_h - scaled_height) / 2,
    }
}

/// How the audio source covers the timeline: whole passes from zero, then a
/// truncated last pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioLoops {
    pub source: MediaTime,
    pub full_passes: u64,
    /// Length of the truncated last pass; zero when the passes fit exactly.
    pub remainder: MediaTime,
}

impl AudioLoops {
    pub fn passes(&self) -> u64 {
        self.full_passes + u64::from(!self.remainder.is_zero())
    }

    /// Whether the source is read more than once.
    pub fn repeats(&self) -> bool {
        self.passes() > 1
    }

    /// Total audio time placed on the timeline.
    pub fn covered(&self) -> MediaTime {
        MediaTime::from_micros(
            self.source
                .as_micros()
                .saturating_mul(self.full_passes)
                .saturating_add(self.remainder.as_micros()),
        )
    }
}

/// Loop `source` from zero until `total` is covered, truncating the last pass.
///
/// Longer audio is simply truncated. A zero-length source yields `None`.
pub fn plan_audio_loops(source: MediaTime, total: MediaTime) -> Option<AudioLoops> {
    if source.is_zero() {
        return None;
    }
    let (source_us, total_us) = (source.as_micros(), total.as_micros());
    Some(AudioLoops {
        source,
        full_passes: total_us / source_us,
        remainder: MediaTime::from_micros(total_us % source_us),
    })
}

/// A segment placed in the composition.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionSegment {
    pub index: usize,
    pub path: PathBuf,
    pub range: TimeRange,
    /// Probed length of the underlying file.
    pub source_duration: MediaTime,
    pub fit: FitInstruction,
    /// Time the last frame is held when the source is shorter than its range.
    pub hold: MediaTime,
}

impl CompositionSegment {
    /// Whether the source is longer than its range and gets cut.
    pub fn is_trimmed(&self) -> bool {
        self.source_duration > self.range.duration
    }
}

/// The looped or trimmed background audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    pub volume: f64,
    pub source_duration: MediaTime,
    pub loops: AudioLoops,
}

impl AudioTrack {
    /// Total audio time placed on the timeline.
    pub fn covered(&self) -> MediaTime {
        self.loops.covered()
    }
}

/// The assembled base timeline, before overlays.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration: MediaTime,
    pub segments: Vec<CompositionSegment>,
    pub audio: Option<AudioTrack>,
}

impl Composition {
    /// The segment on screen at `t`, if `t` is inside the timeline.
    pub fn segment_at(&self, t: MediaTime) -> Option<&CompositionSegment> {
        let idx = self
            .segments
            .partition_point(|segment| segment.range.end() <= t);
        self.segments
            .get(idx)
            .filter(|segment| segment.range.contains(t))
    }
}

/// Builds a [`Composition`] from written segments.
pub struct CompositionAssembler<'a> {
    encoder: &'a dyn MediaEncoder,
    config: &'a RenderConfig,
}

impl<'a> CompositionAssembler<'a> {
    pub fn new(encoder: &'a dyn MediaEncoder, config: &'a RenderConfig) -> Self {
        Self { encoder, config }
    }

    /// Probe every segment and the audio source and lay them out back to back.
    pub async fn assemble(
        &self,
        segments: &[SegmentRef],
        audio: Option<&AudioSource>,
        duration: MediaTime,
    ) -> ReelResult<Composition> {
        if segments.is_empty() {
            return Err(ReelError::assembly("no segments to assemble"));
        }

        let mut placed = Vec::with_capacity(segments.len());
        let mut cursor = MediaTime::ZERO;
        for segment in segments {
            if segment.range.start != cursor {
                return Err(ReelError::assembly(format!(
                    "segment {} starts at {} but the timeline is at {}",
                    segment.index, segment.range.start, cursor
                )));
            }
            placed.push(self.place(segment).await?);
            cursor = segment.range.end();
        }
        if cursor != duration {
            return Err(ReelError::assembly(format!(
                "segments cover {cursor} but output duration is {duration}"
            )));
        }

        let audio = match audio {
            Some(source) => Some(self.load_audio(source, duration).await?),
            None => None,
        };

        tracing::info!(
            segments = placed.len(),
            duration_secs = duration.as_secs_f64(),
            audio = audio.is_some(),
            "Composition assembled"
        );

        Ok(Composition {
            width: self.config.width(),
            height: self.config.height(),
            fps: self.config.fps(),
            duration,
            segments: placed,
            audio,
        })
    }

    async fn place(&self, segment: &SegmentRef) -> ReelResult<CompositionSegment> {
        let info = self.encoder.probe(&segment.path).await.map_err(|e| {
            ReelError::assembly(format!(
                "segment {} ({}) failed to load: {e}",
                segment.index,
                segment.path.display()
            ))
        })?;
        if !info.has_video || info.width == 0 || info.height == 0 {
            return Err(ReelError::assembly(format!(
                "segment {} ({}) has no video stream",
                segment.index,
                segment.path.display()
            )));
        }
        if info.duration.is_zero() {
            return Err(ReelError::assembly(format!(
                "segment {} ({}) is empty",
                segment.index,
                segment.path.display()
            )));
        }

        let fps = self.config.fps();
        let wanted = segment.range.duration;
        let hold = if info.duration < wanted
            && !within_one_frame(info.duration.as_micros(), wanted.as_micros(), fps)
        {
            tracing::warn!(
                index = segment.index,
                source_secs = info.duration.as_secs_f64(),
                range_secs = wanted.as_secs_f64(),
                "Source shorter than its range; holding last frame"
            );
            wanted - info.duration
        } else {
            MediaTime::ZERO
        };
        if info.duration > wanted {
            tracing::debug!(
                index = segment.index,
                source_secs = info.duration.as_secs_f64(),
                range_secs = wanted.as_secs_f64(),
                "Trimming source to its range"
            );
        }

        Ok(CompositionSegment {
            index: segment.index,
            path: segment.path.clone(),
            range: segment.range,
            source_duration: info.duration,
            fit: aspect_fit(
                info.width,
                info.height,
                self.config.width(),
                self.config.height(),
            ),
            hold,
        })
    }

    async fn load_audio(&self, source: &AudioSource, total: MediaTime) -> ReelResult<AudioTrack> {
        let info = self.encoder.probe(&source.path).await.map_err(|e| {
            ReelError::assembly(format!(
                "audio {} failed to load: {e}",
                source.path.display()
            ))
        })?;
        if !info.has_audio {
            return Err(ReelError::assembly(format!(
                "audio {} has no audio stream",
                source.path.display()
            )));
        }
        let Some(loops) = plan_audio_loops(info.duration, total) else {
            return Err(ReelError::assembly(format!(
                "audio {} is empty",
                source.path.display()
            )));
        };
        tracing::debug!(
            source_secs = info.duration.as_secs_f64(),
            passes = loops.passes(),
            "Audio laid out"
        );
        Ok(AudioTrack {
            path: source.path.clone(),
            volume: source.volume,
            source_duration: info.duration,
            loops,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(s: f64) -> MediaTime {
        MediaTime::from_secs_f64(s)
    }

    #[test]
    fn test_fit_landscape_into_portrait() {
        let fit = aspect_fit(1920, 1080, 1080, 1920);
        assert_eq!(fit.scaled_width, 1080);
        assert_eq!(fit.scaled_height, 608);
        assert_eq!(fit.offset_x, 0);
        assert_eq!(fit.offset_y, 656);
    }

    #[test]
    fn test_fit_same_aspect_is_identity() {
        let fit = aspect_fit(540, 960, 1080, 1920);
        assert!((fit.scale - 2.0).abs() < 1e-9);
        assert!(fit.is_identity(1080, 1920));
    }

    #[test]
    fn test_audio_shorter_loops_and_truncates() {
        let loops = plan_audio_loops(secs(10.0), secs(15.0)).unwrap();
        assert_eq!(
            loops,
            AudioLoops {
                source: secs(10.0),
                full_passes: 1,
                remainder: secs(5.0),
            }
        );
        assert_eq!(loops.passes(), 2);
        assert!(loops.repeats());
        assert_eq!(loops.covered(), secs(15.0));
    }

    #[test]
    fn test_audio_longer_is_truncated() {
        let loops = plan_audio_loops(secs(30.0), secs(7.0)).unwrap();
        assert_eq!(loops.full_passes, 0);
        assert_eq!(loops.remainder, secs(7.0));
        assert_eq!(loops.passes(), 1);
        assert!(!loops.repeats());
    }

    #[test]
    fn test_exact_fit_is_one_pass() {
        let loops = plan_audio_loops(secs(5.0), secs(5.0)).unwrap();
        assert_eq!(loops.passes(), 1);
        assert!(loops.remainder.is_zero());
    }

    #[test]
    fn test_tiny_audio_over_long_timeline() {
        let loops = plan_audio_loops(MediaTime::from_millis(1), secs(60.0)).unwrap();
        assert_eq!(loops.full_passes, 60_000);
        assert_eq!(loops.covered(), secs(60.0));
    }

    #[test]
    fn test_empty_audio_has_no_loops() {
        assert!(plan_audio_loops(MediaTime::ZERO, secs(5.0)).is_none());
    }

    #[test]
    fn test_segment_lookup_is_half_open() {
        let segment = |index: usize, start: f64, dur: f64| CompositionSegment {
            index,
            path: PathBuf::from(format!("{index}.mp4")),
            range: TimeRange::from_secs(start, dur),
            source_duration: secs(dur),
            fit: aspect_fit(1080, 1920, 1080, 1920),
            hold: MediaTime::ZERO,
        };
        let composition = Composition {
            width: 1080,
            height: 1920,
            fps: 30,
            duration: secs(5.0),
            segments: vec![segment(0, 0.0, 2.0), segment(1, 2.0, 3.0)],
            audio: None,
        };
        assert_eq!(composition.segment_at(secs(1.999)).map(|s| s.index), Some(0));
        assert_eq!(composition.segment_at(secs(2.0)).map(|s| s.index), Some(1));
        assert!(composition.segment_at(secs(5.0)).is_none());
    }

    proptest! {
        #[test]
        fn prop_fit_stays_inside_and_centered(
            src_w in 1u32..8000,
            src_h in 1u32..8000,
            half_w in 1u32..2000,
            half_h in 1u32..2000,
        ) {
            let (cw, ch) = (half_w * 2, half_h * 2);
            let fit = aspect_fit(src_w, src_h, cw, ch);
            prop_assert!(fit.scaled_width <= cw && fit.scaled_height <= ch);
            prop_assert_eq!(fit.offset_x * 2 + fit.scaled_width, cw);
            prop_assert_eq!(fit.offset_y * 2 + fit.scaled_height, ch);
            // One axis is (nearly) filled.
            prop_assert!(cw - fit.scaled_width <= 2 || ch - fit.scaled_height <= 2);
        }

        #[test]
        fn prop_audio_loops_cover_exactly(
            source_ms in 1u64..60_000,
            total_ms in 1u64..120_000,
        ) {
            let source = MediaTime::from_millis(source_ms);
            let total = MediaTime::from_millis(total_ms);
            let loops = plan_audio_loops(source, total).unwrap();
            prop_assert_eq!(loops.covered(), total);
            prop_assert!(loops.remainder < source);
            prop_assert_eq!(loops.passes(), total_ms.div_ceil(source_ms));
        }
    }
}

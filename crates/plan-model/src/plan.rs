//! Render plans: the ordered timeline handed to the renderer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::filter::FilterSpec;
use crate::overlay::Overlay;
use crate::time::{MediaTime, TimeRange};
use crate::transform::{PanZoom, Transform2D};

/// A photograph shown for a fixed time with optional treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StillItem {
    pub range: TimeRange,

    pub image: PathBuf,

    /// Applied in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,

    #[serde(default)]
    pub transform: Transform2D,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<PanZoom>,
}

/// A pre-existing video clip placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipItem {
    pub range: TimeRange,

    pub source: PathBuf,
}

/// One time-bounded unit of visual content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackItem {
    Still(StillItem),
    Clip(ClipItem),
}

impl TrackItem {
    pub fn range(&self) -> TimeRange {
        match self {
            TrackItem::Still(still) => still.range,
            TrackItem::Clip(clip) => clip.range,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TrackItem::Still(_) => "still",
            TrackItem::Clip(_) => "clip",
        }
    }

    /// The media file this item reads.
    pub fn source_path(&self) -> &Path {
        match self {
            TrackItem::Still(still) => &still.image,
            TrackItem::Clip(clip) => &clip.source,
        }
    }
}

/// Background audio for the whole render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSource {
    pub path: PathBuf,

    /// Linear gain applied to the track.
    #[serde(default = "default_volume")]
    pub volume: f64,
}

impl AudioSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            volume: default_volume(),
        }
    }
}

fn default_volume() -> f64 {
    1.0
}

/// Errors raised while building or loading plans and configs.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan contains no track items")]
    Empty,

    #[error("output duration must be greater than zero")]
    ZeroDuration,

    #[error("output duration {found} exceeds the {limit} limit")]
    TooLong { found: MediaTime, limit: MediaTime },

    #[error("track item {index} has zero duration")]
    ZeroLengthItem { index: usize },

    #[error("track item {index} starts at {found}, expected {expected}")]
    NotContiguous {
        index: usize,
        expected: MediaTime,
        found: MediaTime,
    },

    #[error("track items cover {covered} but output duration is {expected}")]
    DurationMismatch {
        covered: MediaTime,
        expected: MediaTime,
    },

    #[error("track item {index}: {message}")]
    InvalidItem { index: usize, message: String },

    #[error("overlay {index}: {message}")]
    InvalidOverlay { index: usize, message: String },

    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    #[error("invalid color {0:?}")]
    InvalidColor(String),

    #[error("invalid render config: {0}")]
    InvalidConfig(String),

    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Ordered description of the final video timeline.
///
/// Invariants, checked on construction and deserialization:
/// - at least one item, output duration > 0
/// - item ranges start at zero, are contiguous, non-overlapping, non-empty
/// - item durations sum exactly to `output_duration`
/// - every overlay is valid and starts before the end of the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RenderPlanSpec", into = "RenderPlanSpec")]
pub struct RenderPlan {
    items: Vec<TrackItem>,
    audio: Option<AudioSource>,
    output_duration: MediaTime,
    overlays: Vec<Overlay>,
}

/// Unvalidated, serialized form of a [`RenderPlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPlanSpec {
    pub items: Vec<TrackItem>,

    #[serde(default)]
    pub audio: Option<AudioSource>,

    pub output_duration: MediaTime,

    #[serde(default)]
    pub overlays: Vec<Overlay>,
}

impl RenderPlan {
    pub fn new(
        items: Vec<TrackItem>,
        audio: Option<AudioSource>,
        output_duration: MediaTime,
        overlays: Vec<Overlay>,
    ) -> Result<Self, PlanError> {
        validate_items(&items, output_duration)?;

        for (index, overlay) in overlays.iter().enumerate() {
            overlay
                .validate()
                .map_err(|message| PlanError::InvalidOverlay { index, message })?;
            if overlay.duration > MediaTime::MAX_SPAN
                || overlay.start.checked_add(overlay.duration).is_none()
            {
                return Err(PlanError::InvalidOverlay {
                    index,
                    message: format!(
                        "duration {} exceeds the {} limit",
                        overlay.duration,
                        MediaTime::MAX_SPAN
                    ),
                });
            }
            if overlay.start >= output_duration {
                return Err(PlanError::InvalidOverlay {
                    index,
                    message: format!(
                        "starts at {} which is past the end of the {} timeline",
                        overlay.start, output_duration
                    ),
                });
            }
        }

        if let Some(audio) = &audio {
            if !audio.volume.is_finite() || !(0.0..=4.0).contains(&audio.volume) {
                return Err(PlanError::InvalidConfig(format!(
                    "audio volume {} outside [0, 4]",
                    audio.volume
                )));
            }
        }

        Ok(Self {
            items,
            audio,
            output_duration,
            overlays,
        })
    }

    pub fn builder() -> RenderPlanBuilder {
        RenderPlanBuilder::default()
    }

    pub fn items(&self) -> &[TrackItem] {
        &self.items
    }

    pub fn audio(&self) -> Option<&AudioSource> {
        self.audio.as_ref()
    }

    pub fn output_duration(&self) -> MediaTime {
        self.output_duration
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn still_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, TrackItem::Still(_)))
            .count()
    }

    /// Load and validate a plan from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| PlanError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| PlanError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the plan as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PlanError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| PlanError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| PlanError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Resolve relative media paths against `base` (typically the plan's directory).
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for item in &mut self.items {
            match item {
                TrackItem::Still(still) => resolve(&mut still.image),
                TrackItem::Clip(clip) => resolve(&mut clip.source),
            }
        }
        if let Some(audio) = &mut self.audio {
            resolve(&mut audio.path);
        }
        for overlay in &mut self.overlays {
            match &mut overlay.content {
                crate::overlay::OverlayContent::Sticker(sticker) => resolve(&mut sticker.image),
                crate::overlay::OverlayContent::Branding(branding) => {
                    if let Some(image) = &mut branding.image {
                        resolve(image);
                    }
                }
                crate::overlay::OverlayContent::Text(_) => {}
            }
        }
        self
    }
}

fn validate_items(items: &[TrackItem], output_duration: MediaTime) -> Result<(), PlanError> {
    if items.is_empty() {
        return Err(PlanError::Empty);
    }
    if output_duration.is_zero() {
        return Err(PlanError::ZeroDuration);
    }
    if output_duration > MediaTime::MAX_SPAN {
        return Err(PlanError::TooLong {
            found: output_duration,
            limit: MediaTime::MAX_SPAN,
        });
    }

    let mut cursor = MediaTime::ZERO;
    for (index, item) in items.iter().enumerate() {
        let range = item.range();
        if range.is_empty() {
            return Err(PlanError::ZeroLengthItem { index });
        }
        if range.start != cursor {
            return Err(PlanError::NotContiguous {
                index,
                expected: cursor,
                found: range.start,
            });
        }
        if let TrackItem::Still(still) = item {
            still
                .transform
                .validate()
                .map_err(|e| PlanError::InvalidItem {
                    index,
                    message: e.to_string(),
                })?;
            if let Some(motion) = &still.motion {
                motion.validate().map_err(|e| PlanError::InvalidItem {
                    index,
                    message: e.to_string(),
                })?;
            }
            if still.filters.iter().any(|f| f.name.trim().is_empty()) {
                return Err(PlanError::InvalidItem {
                    index,
                    message: "filter with empty name".to_string(),
                });
            }
        }
        cursor = cursor.checked_add(range.duration).ok_or(PlanError::InvalidItem {
            index,
            message: "timeline overflow".to_string(),
        })?;
    }

    if cursor != output_duration {
        return Err(PlanError::DurationMismatch {
            covered: cursor,
            expected: output_duration,
        });
    }
    Ok(())
}

impl TryFrom<RenderPlanSpec> for RenderPlan {
    type Error = PlanError;

    fn try_from(spec: RenderPlanSpec) -> Result<Self, Self::Error> {
        RenderPlan::new(spec.items, spec.audio, spec.output_duration, spec.overlays)
    }
}

impl From<RenderPlan> for RenderPlanSpec {
    fn from(plan: RenderPlan) -> Self {
        Self {
            items: plan.items,
            audio: plan.audio,
            output_duration: plan.output_duration,
            overlays: plan.overlays,
        }
    }
}

/// Appends items back to back so ranges are contiguous by construction.
#[derive(Debug, Default)]
pub struct RenderPlanBuilder {
    items: Vec<TrackItem>,
    audio: Option<AudioSource>,
    overlays: Vec<Overlay>,
    cursor: MediaTime,
}

impl RenderPlanBuilder {
    /// Append an untreated still.
    pub fn still(self, image: impl Into<PathBuf>, duration: MediaTime) -> Self {
        self.still_with(image, duration, Vec::new(), Transform2D::IDENTITY, None)
    }

    /// Append a still with filters, transform, and optional motion.
    pub fn still_with(
        mut self,
        image: impl Into<PathBuf>,
        duration: MediaTime,
        filters: Vec<FilterSpec>,
        transform: Transform2D,
        motion: Option<PanZoom>,
    ) -> Self {
        let range = TimeRange::new(self.cursor, duration);
        self.cursor = self.cursor + duration;
        self.items.push(TrackItem::Still(StillItem {
            range,
            image: image.into(),
            filters,
            transform,
            motion,
        }));
        self
    }

    /// Append a clip.
    pub fn clip(mut self, source: impl Into<PathBuf>, duration: MediaTime) -> Self {
        let range = TimeRange::new(self.cursor, duration);
        self.cursor = self.cursor + duration;
        self.items.push(TrackItem::Clip(ClipItem {
            range,
            source: source.into(),
        }));
        self
    }

    pub fn audio(mut self, audio: AudioSource) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn overlay(mut self, overlay: Overlay) -> Self {
        self.overlays.push(overlay);
        self
    }

    /// Validate and finish; the output duration is the sum of item durations.
    pub fn build(self) -> Result<RenderPlan, PlanError> {
        RenderPlan::new(self.items, self.audio, self.cursor, self.overlays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(s: f64) -> MediaTime {
        MediaTime::from_secs_f64(s)
    }

    fn still_at(start: f64, duration: f64) -> TrackItem {
        TrackItem::Still(StillItem {
            range: TimeRange::from_secs(start, duration),
            image: PathBuf::from("a.jpg"),
            filters: vec![],
            transform: Transform2D::IDENTITY,
            motion: None,
        })
    }

    #[test]
    fn test_builder_produces_contiguous_plan() {
        let plan = RenderPlan::builder()
            .still("a.jpg", secs(2.0))
            .still("b.jpg", secs(3.0))
            .clip("c.mp4", secs(2.0))
            .build()
            .unwrap();
        assert_eq!(plan.output_duration(), secs(7.0));
        assert_eq!(plan.items()[2].range(), TimeRange::from_secs(5.0, 2.0));
        assert_eq!(plan.still_count(), 2);
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert!(matches!(
            RenderPlan::new(vec![], None, secs(1.0), vec![]),
            Err(PlanError::Empty)
        ));
    }

    #[test]
    fn test_gap_rejected() {
        let items = vec![still_at(0.0, 2.0), still_at(2.5, 1.0)];
        assert!(matches!(
            RenderPlan::new(items, None, secs(3.5), vec![]),
            Err(PlanError::NotContiguous { index: 1, .. })
        ));
    }

    #[test]
    fn test_overlap_rejected() {
        let items = vec![still_at(0.0, 2.0), still_at(1.5, 1.0)];
        assert!(matches!(
            RenderPlan::new(items, None, secs(2.5), vec![]),
            Err(PlanError::NotContiguous { index: 1, .. })
        ));
    }

    #[test]
    fn test_duration_mismatch_rejected() {
        let items = vec![still_at(0.0, 2.0), still_at(2.0, 1.0)];
        assert!(matches!(
            RenderPlan::new(items, None, secs(4.0), vec![]),
            Err(PlanError::DurationMismatch { .. })
        ));
    }

    #[test]
    fn test_overlay_past_end_rejected() {
        let result = RenderPlan::builder()
            .still("a.jpg", secs(2.0))
            .overlay(Overlay::caption(2.0, 1.0, "late"))
            .build();
        assert!(matches!(
            result,
            Err(PlanError::InvalidOverlay { index: 0, .. })
        ));
    }

    #[test]
    fn test_deserialization_runs_validation() {
        let json = r#"{
            "items": [
                { "kind": "still", "range": { "start": 0.0, "duration": 2.0 }, "image": "a.jpg" },
                { "kind": "clip", "range": { "start": 2.0, "duration": 1.5 }, "source": "b.mp4" }
            ],
            "output_duration": 3.5
        }"#;
        let plan: RenderPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.items().len(), 2);
        assert_eq!(plan.items()[1].kind(), "clip");

        let bad = json.replace("\"output_duration\": 3.5", "\"output_duration\": 4.0");
        assert!(serde_json::from_str::<RenderPlan>(&bad).is_err());
    }

    #[test]
    fn test_overlay_with_absurd_duration_rejected() {
        let json = r#"{
            "items": [
                { "kind": "still", "range": { "start": 0.0, "duration": 2.0 }, "image": "a.jpg" }
            ],
            "output_duration": 2.0,
            "overlays": [
                { "start": 1.0, "duration": 1e300, "content": { "kind": "text", "text": "hi" } }
            ]
        }"#;
        let err = serde_json::from_str::<RenderPlan>(json).unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{err}");
        let sane = json.replace("1e300", "1.0");
        assert!(serde_json::from_str::<RenderPlan>(&sane).is_ok());

        let result = RenderPlan::builder()
            .still("a.jpg", secs(2.0))
            .overlay(Overlay::new(
                secs(1.0),
                MediaTime::from_micros(u64::MAX),
                Overlay::caption(0.0, 1.0, "hi").content,
            ))
            .build();
        assert!(matches!(
            result,
            Err(PlanError::InvalidOverlay { index: 0, .. })
        ));
    }

    #[test]
    fn test_timeline_longer_than_a_day_rejected() {
        let huge = MediaTime::from_secs_f64(1e12);
        let items = vec![TrackItem::Still(StillItem {
            range: TimeRange::new(MediaTime::ZERO, huge),
            image: PathBuf::from("a.jpg"),
            filters: vec![],
            transform: Transform2D::IDENTITY,
            motion: None,
        })];
        assert!(matches!(
            RenderPlan::new(items, None, huge, vec![]),
            Err(PlanError::TooLong { .. })
        ));

        let day = RenderPlan::builder().still("a.jpg", MediaTime::MAX_SPAN).build();
        assert!(day.is_ok());
    }

    #[test]
    fn test_resolve_relative_paths() {
        let plan = RenderPlan::builder()
            .still("a.jpg", secs(1.0))
            .clip("/abs/b.mp4", secs(1.0))
            .audio(AudioSource::new("music.m4a"))
            .build()
            .unwrap()
            .resolve_paths(Path::new("/plans"));
        assert_eq!(plan.items()[0].source_path(), Path::new("/plans/a.jpg"));
        assert_eq!(plan.items()[1].source_path(), Path::new("/abs/b.mp4"));
        assert_eq!(plan.audio().unwrap().path, PathBuf::from("/plans/music.m4a"));
    }

    proptest! {
        #[test]
        fn prop_builder_durations_sum_to_output(durations in prop::collection::vec(1u64..10_000_000, 1..20)) {
            let mut builder = RenderPlan::builder();
            for (i, d) in durations.iter().enumerate() {
                builder = builder.still(format!("{i}.jpg"), MediaTime::from_micros(*d));
            }
            let plan = builder.build().unwrap();
            let sum: u64 = plan.items().iter().map(|item| item.range().duration.as_micros()).sum();
            prop_assert_eq!(sum, plan.output_duration().as_micros());
            for pair in plan.items().windows(2) {
                prop_assert_eq!(pair[0].range().end(), pair[1].range().start);
            }
        }

        #[test]
        fn prop_any_shifted_item_is_rejected(
            durations in prop::collection::vec(1u64..5_000_000, 2..10),
            victim in 1usize..10,
            shift in 1u64..1_000,
        ) {
            let victim = victim % durations.len();
            prop_assume!(victim > 0);
            let mut items = Vec::new();
            let mut cursor = 0u64;
            for (i, d) in durations.iter().enumerate() {
                let start = if i == victim { cursor + shift } else { cursor };
                items.push(TrackItem::Clip(ClipItem {
                    range: TimeRange::new(MediaTime::from_micros(start), MediaTime::from_micros(*d)),
                    source: PathBuf::from("c.mp4"),
                }));
                cursor = start + d;
            }
            let result = RenderPlan::new(items, None, MediaTime::from_micros(cursor), vec![]);
            prop_assert!(result.is_err());
        }
    }
}

//! Encoder seam: the native media toolchain the pipeline drives.

use std::path::{Path, PathBuf};

use reelsmith_common::error::ReelResult;
use reelsmith_plan_model::{FilterSpec, MediaTime, OutputPreset, PanZoom, RenderConfig, Transform2D};

use crate::assembler::{Composition, FitInstruction};
use crate::overlay::OverlayLayer;

/// Stream facts read back from a media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration: MediaTime,
    pub width: u32,
    pub height: u32,
    pub has_video: bool,
    pub has_audio: bool,
}

/// What an encoder reports about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderCapabilities {
    pub name: String,
    pub version: Option<String>,
    pub presets: Vec<OutputPreset>,
}

impl EncoderCapabilities {
    pub fn supports(&self, preset: OutputPreset) -> bool {
        self.presets.contains(&preset)
    }
}

/// One still image rendered into a fixed-duration segment.
#[derive(Debug, Clone)]
pub struct StillSegmentJob {
    /// Track item index in the plan.
    pub index: usize,

    pub image: PathBuf,

    /// Decoded image dimensions.
    pub source_width: u32,
    pub source_height: u32,

    /// Placement of the image inside the canvas.
    pub fit: FitInstruction,

    pub duration: MediaTime,
    pub filters: Vec<FilterSpec>,
    pub transform: Transform2D,
    pub motion: Option<PanZoom>,
    pub config: RenderConfig,

    /// Where the segment file must be written.
    pub output: PathBuf,
}

/// The assembled timeline plus overlay layers, ready for final encode.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub composition: Composition,
    pub layers: Vec<OverlayLayer>,
    pub config: RenderConfig,
    pub output: PathBuf,
}

/// Progress sink for an encode, fed values in `[0, 1]`.
pub type EncodeProgress<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// Trait for native encode backends (ffmpeg, test doubles).
///
/// Futures returned by these methods may be dropped at any await point;
/// implementations must release child processes when that happens.
#[async_trait::async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Encode one still segment to `job.output`.
    async fn write_still(&self, job: &StillSegmentJob) -> ReelResult<()>;

    /// Read duration and stream layout from a media file.
    async fn probe(&self, path: &Path) -> ReelResult<MediaInfo>;

    /// Encode the final composition to `job.output`.
    async fn export(&self, job: &ExportJob, progress: EncodeProgress<'_>) -> ReelResult<()>;

    /// Report name, version and supported presets.
    async fn capabilities(&self) -> ReelResult<EncoderCapabilities>;

    /// Check if this backend can run on the system.
    async fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

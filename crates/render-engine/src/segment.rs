//! Still segment writer: one photograph plus treatment into a timed segment.

use std::path::PathBuf;

use reelsmith_common::clock::within_one_frame;
use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_plan_model::{ClipItem, RenderConfig, StillItem, TimeRange};

use crate::assembler::aspect_fit;
use crate::encoder::{MediaEncoder, StillSegmentJob};
use crate::workspace::RenderWorkspace;

/// Where a segment's pixels come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSource {
    /// Rendered into the workspace from a still.
    Rendered,
    /// A caller-provided clip used in place.
    Clip,
}

/// A segment file and its slot on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    pub index: usize,
    pub path: PathBuf,
    pub range: TimeRange,
    pub source: SegmentSource,
}

impl SegmentRef {
    /// Reference a clip item directly; clips are not re-rendered.
    pub fn for_clip(index: usize, clip: &ClipItem) -> Self {
        Self {
            index,
            path: clip.source.clone(),
            range: clip.range,
            source: SegmentSource::Clip,
        }
    }
}

/// Renders stills into segment files inside a render workspace.
pub struct StillSegmentWriter<'a> {
    encoder: &'a dyn MediaEncoder,
    config: &'a RenderConfig,
    workspace: &'a RenderWorkspace,
}

impl<'a> StillSegmentWriter<'a> {
    pub fn new(
        encoder: &'a dyn MediaEncoder,
        config: &'a RenderConfig,
        workspace: &'a RenderWorkspace,
    ) -> Self {
        Self {
            encoder,
            config,
            workspace,
        }
    }

    /// Write the segment for track item `index`.
    ///
    /// Any failure is a segment error carrying `index`.
    pub async fn write(&self, index: usize, still: &StillItem) -> ReelResult<SegmentRef> {
        let started = std::time::Instant::now();
        let (source_width, source_height) = decode_dimensions(index, still.image.clone()).await?;

        let fit = aspect_fit(
            source_width,
            source_height,
            self.config.width(),
            self.config.height(),
        );
        let output = self.workspace.segment_path(index);
        let job = StillSegmentJob {
            index,
            image: still.image.clone(),
            source_width,
            source_height,
            fit,
            duration: still.range.duration,
            filters: still.filters.clone(),
            transform: still.transform,
            motion: still.motion,
            config: self.config.clone(),
            output: output.clone(),
        };

        self.encoder
            .write_still(&job)
            .await
            .map_err(|e| ReelError::segment(index, format!("encode failed: {e}")))?;

        let info = self
            .encoder
            .probe(&output)
            .await
            .map_err(|e| ReelError::segment(index, format!("written segment unreadable: {e}")))?;

        let expected = still.range.duration;
        if !within_one_frame(
            info.duration.as_micros(),
            expected.as_micros(),
            self.config.fps(),
        ) {
            return Err(ReelError::segment(
                index,
                format!(
                    "segment duration {} does not match requested {}",
                    info.duration, expected
                ),
            ));
        }

        tracing::info!(
            index,
            image = %still.image.display(),
            source = %format!("{source_width}x{source_height}"),
            duration_secs = expected.as_secs_f64(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Still segment written"
        );

        Ok(SegmentRef {
            index,
            path: output,
            range: still.range,
            source: SegmentSource::Rendered,
        })
    }
}

/// Decode the image fully off the async runtime and return its dimensions.
async fn decode_dimensions(index: usize, path: PathBuf) -> ReelResult<(u32, u32)> {
    let display = path.display().to_string();
    let decoded = tokio::task::spawn_blocking(move || -> Result<(u32, u32), String> {
        let bytes = std::fs::read(&path).map_err(|e| format!("cannot read image: {e}"))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| format!("cannot decode image: {e}"))?;
        Ok((image.width(), image.height()))
    })
    .await
    .map_err(|e| ReelError::segment(index, format!("decode task failed: {e}")))?;

    match decoded {
        Ok((0, _)) | Ok((_, 0)) => Err(ReelError::segment(
            index,
            format!("image {display} has zero size"),
        )),
        Ok(dims) => Ok(dims),
        Err(message) => Err(ReelError::segment(index, format!("{display}: {message}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decode_dimensions_reads_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        image::RgbImage::new(8, 6).save(&path).unwrap();
        assert_eq!(decode_dimensions(0, path).await.unwrap(), (8, 6));
    }

    #[tokio::test]
    async fn test_decode_garbage_is_segment_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        let err = decode_dimensions(4, path).await.unwrap_err();
        assert!(matches!(err, ReelError::Segment { index: 4, .. }));
    }

    #[tokio::test]
    async fn test_decode_missing_file_is_segment_error() {
        let err = decode_dimensions(1, PathBuf::from("/nonexistent/x.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::Segment { index: 1, .. }));
    }

    #[test]
    fn test_clip_ref_points_at_source() {
        let clip = ClipItem {
            range: TimeRange::from_secs(2.0, 3.0),
            source: PathBuf::from("/media/clip.mp4"),
        };
        let r = SegmentRef::for_clip(1, &clip);
        assert_eq!(r.source, SegmentSource::Clip);
        assert_eq!(r.path, PathBuf::from("/media/clip.mp4"));
        assert_eq!(r.range, clip.range);
    }
}

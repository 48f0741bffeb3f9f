//! Scripted encoder and fixtures for render scenario tests.
//!
//! The fake encoder never produces real video. Every "media file" it writes
//! is a small JSON document describing the streams, and `probe` reads those
//! documents back. Test audio and clips are written the same way; still
//! images are real PNGs so decoding goes through the `image` crate.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reelsmith_common::config::{ExportLimits, MemoryLimits};
use reelsmith_common::error::{ReelError, ReelResult, RenderPhase};
use reelsmith_plan_model::{MediaTime, OutputPreset, RenderConfig, RenderPlan};
use reelsmith_render_engine::encoder::EncodeProgress;
use reelsmith_render_engine::graph::{export_graph, still_segment_graph};
use reelsmith_render_engine::{
    EncoderCapabilities, ExportJob, MediaEncoder, MediaInfo, MemoryMonitor, MemoryProbe,
    ProgressCallback, RenderContext, RenderOptions, RenderOutput, RenderProgress, Renderer,
    StillSegmentJob,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const NORMAL_MEMORY: u64 = 64 * 1024 * 1024;
pub const CRITICAL_MEMORY: u64 = 1024 * 1024 * 1024;

const PROGRESS_STEP: Duration = Duration::from_millis(20);

#[derive(Debug, Serialize, Deserialize)]
struct FakeMedia {
    duration_us: u64,
    width: u32,
    height: u32,
    video: bool,
    audio: bool,
}

/// Write a fake media document at `path`.
pub fn write_media(path: &Path, secs: f64, video: bool, audio: bool) {
    let media = FakeMedia {
        duration_us: MediaTime::from_secs_f64(secs).as_micros(),
        width: if video { 640 } else { 0 },
        height: if video { 360 } else { 0 },
        video,
        audio,
    };
    std::fs::write(path, serde_json::to_vec(&media).unwrap()).unwrap();
}

/// Memory readings controlled by the test and the fake encoder.
pub struct SharedProbe(pub Arc<AtomicU64>);

impl MemoryProbe for SharedProbe {
    fn used_bytes(&self) -> Option<u64> {
        Some(self.0.load(Ordering::SeqCst))
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Encoder double with scripted timing and failures.
pub struct FakeEncoder {
    export_time: Duration,
    fail_export: bool,
    export_skew_secs: f64,
    pressure_after: Option<Duration>,
    memory: Arc<AtomicU64>,
    stills: Mutex<Vec<usize>>,
    created: Mutex<Vec<PathBuf>>,
    last_export: Mutex<Option<ExportJob>>,
    exports_started: AtomicUsize,
    export_finished: AtomicBool,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self {
            export_time: Duration::from_millis(100),
            fail_export: false,
            export_skew_secs: 0.0,
            pressure_after: None,
            memory: Arc::new(AtomicU64::new(NORMAL_MEMORY)),
            stills: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            last_export: Mutex::new(None),
            exports_started: AtomicUsize::new(0),
            export_finished: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn with_export_time(mut self, export_time: Duration) -> Self {
        self.export_time = export_time;
        self
    }

    pub fn failing_export(mut self) -> Self {
        self.fail_export = true;
        self
    }

    /// Write exports whose duration is off by `secs`.
    pub fn with_export_skew(mut self, secs: f64) -> Self {
        self.export_skew_secs = secs;
        self
    }

    /// Raise memory to the critical band this long into the export.
    pub fn with_pressure_after(mut self, after: Duration) -> Self {
        self.pressure_after = Some(after);
        self
    }

    pub fn memory(&self) -> Arc<AtomicU64> {
        self.memory.clone()
    }

    /// Track item indices for which a still segment was written, in order.
    pub fn still_indices(&self) -> Vec<usize> {
        self.stills.lock().unwrap().clone()
    }

    /// Every file this encoder wrote.
    pub fn created(&self) -> Vec<PathBuf> {
        self.created.lock().unwrap().clone()
    }

    pub fn last_export(&self) -> Option<ExportJob> {
        self.last_export.lock().unwrap().clone()
    }

    pub fn exports_started(&self) -> usize {
        self.exports_started.load(Ordering::SeqCst)
    }

    pub fn export_finished(&self) -> bool {
        self.export_finished.load(Ordering::SeqCst)
    }

    /// Most native operations observed running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ActiveGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        ActiveGuard(&self.active)
    }

    fn write(&self, path: &Path, media: &FakeMedia) -> ReelResult<()> {
        std::fs::write(path, serde_json::to_vec(media)?)?;
        self.created.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

#[async_trait::async_trait]
impl MediaEncoder for FakeEncoder {
    async fn write_still(&self, job: &StillSegmentJob) -> ReelResult<()> {
        let _active = self.enter();
        still_segment_graph(job)?;
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.stills.lock().unwrap().push(job.index);
        self.write(
            &job.output,
            &FakeMedia {
                duration_us: job.duration.as_micros(),
                width: job.config.width(),
                height: job.config.height(),
                video: true,
                audio: false,
            },
        )
    }

    async fn probe(&self, path: &Path) -> ReelResult<MediaInfo> {
        let bytes = tokio::fs::read(path).await?;
        let media: FakeMedia = serde_json::from_slice(&bytes).map_err(|e| {
            ReelError::Other(anyhow::anyhow!("not a media file {}: {e}", path.display()))
        })?;
        Ok(MediaInfo {
            duration: MediaTime::from_micros(media.duration_us),
            width: media.width,
            height: media.height,
            has_video: media.video,
            has_audio: media.audio,
        })
    }

    async fn export(&self, job: &ExportJob, progress: EncodeProgress<'_>) -> ReelResult<()> {
        let _active = self.enter();
        self.exports_started.fetch_add(1, Ordering::SeqCst);
        *self.last_export.lock().unwrap() = Some(job.clone());
        let graph = export_graph(job);
        assert!(graph.filter_complex.contains("[vout]"));

        let started = Instant::now();
        while started.elapsed() < self.export_time {
            tokio::time::sleep(PROGRESS_STEP).await;
            if let Some(after) = self.pressure_after {
                if started.elapsed() >= after {
                    self.memory.store(CRITICAL_MEMORY, Ordering::SeqCst);
                }
            }
            progress(started.elapsed().as_secs_f64() / self.export_time.as_secs_f64());
        }

        if self.fail_export {
            return Err(ReelError::encoding(
                RenderPhase::Export,
                "encoder exited with status 1",
            ));
        }
        let duration = (job.composition.duration.as_secs_f64() + self.export_skew_secs).max(0.0);
        self.write(
            &job.output,
            &FakeMedia {
                duration_us: MediaTime::from_secs_f64(duration).as_micros(),
                width: job.composition.width,
                height: job.composition.height,
                video: true,
                audio: job.composition.audio.is_some(),
            },
        )?;
        self.export_finished.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn capabilities(&self) -> ReelResult<EncoderCapabilities> {
        Ok(EncoderCapabilities {
            name: "fake".to_string(),
            version: Some("1.0".to_string()),
            presets: vec![OutputPreset::Mp4H264, OutputPreset::Mp4H265, OutputPreset::Webm],
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Temp directory, fake encoder, and a renderer wired to both.
pub struct Harness {
    pub dir: TempDir,
    pub fake: Arc<FakeEncoder>,
    pub context: RenderContext,
    pub monitor: Arc<MemoryMonitor>,
    pub options: RenderOptions,
}

impl Harness {
    pub fn new(fake: FakeEncoder) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(fake);
        let context = RenderContext::new(fake.clone());
        let monitor = Arc::new(MemoryMonitor::new(
            Box::new(SharedProbe(fake.memory())),
            MemoryLimits {
                elevated_mb: 256,
                critical_mb: 512,
            },
        ));
        let options = RenderOptions {
            temp_root: dir.path().join("scratch"),
            limits: ExportLimits {
                poll_interval_ms: 50,
                fast_timeout_secs: 25.0,
                full_timeout_secs: 60.0,
            },
            timeout_override: None,
            write_report: false,
        };
        Self {
            dir,
            fake,
            context,
            monitor,
            options,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a real PNG still.
    pub fn image(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.path(name);
        image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]))
            .save(&path)
            .unwrap();
        path
    }

    /// Write bytes that no image decoder accepts, under an image name.
    pub fn corrupt_image(&self, name: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, b"this is not a jpeg").unwrap();
        path
    }

    pub fn audio(&self, name: &str, secs: f64) -> PathBuf {
        let path = self.path(name);
        write_media(&path, secs, false, true);
        path
    }

    pub fn clip(&self, name: &str, secs: f64) -> PathBuf {
        let path = self.path(name);
        write_media(&path, secs, true, false);
        path
    }

    pub fn renderer(&self) -> Renderer<'_> {
        Renderer::new(&self.context, self.monitor.clone(), self.options.clone())
    }

    pub async fn render(
        &self,
        plan: &RenderPlan,
        config: &RenderConfig,
        output: &Path,
    ) -> ReelResult<RenderOutput> {
        self.renderer()
            .render(plan, config, output, &CancellationToken::new(), None)
            .await
    }

    /// Files still present under the temp root.
    pub fn leftover_temps(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut pending = vec![self.options.temp_root.clone()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path.clone());
                }
                found.push(path);
            }
        }
        found
    }

    /// Assert every file the encoder wrote is gone, except `keep`.
    pub fn assert_no_leaked_temps(&self, keep: Option<&Path>) {
        assert!(
            self.leftover_temps().is_empty(),
            "temp files left behind: {:?}",
            self.leftover_temps()
        );
        for path in self.fake.created() {
            if Some(path.as_path()) != keep {
                assert!(!path.exists(), "{} still exists", path.display());
            }
        }
    }
}

/// Progress callback that records every reading.
pub fn recording_progress() -> (ProgressCallback, Arc<Mutex<Vec<RenderProgress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ProgressCallback = Arc::new(move |p: RenderProgress| {
        sink.lock().unwrap().push(p);
    });
    (callback, seen)
}

pub fn secs(s: f64) -> MediaTime {
    MediaTime::from_secs_f64(s)
}

pub fn small_config() -> RenderConfig {
    RenderConfig::builder().size(360, 640).fps(10).build().unwrap()
}

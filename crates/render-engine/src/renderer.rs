//! Render orchestrator: Prepare → Segment → Assemble → Overlay → Export → Cleanup.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reelsmith_common::clock::{within_one_frame, RenderClock};
use reelsmith_common::config::{AppConfig, ExportLimits};
use reelsmith_common::error::{CancelReason, ReelError, ReelResult, RenderPhase};
use reelsmith_plan_model::{MediaTime, RenderConfig, RenderPlan, TimeRange, TrackItem};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::assembler::{Composition, CompositionAssembler};
use crate::compositor::CompositionReport;
use crate::context::RenderContext;
use crate::encoder::ExportJob;
use crate::export::{ExportSettings, Exporter};
use crate::filters::compile_chain;
use crate::monitor::{MemoryMonitor, PhaseTimings, PressureBand};
use crate::overlay::{OverlayLayer, OverlayLayerFactory};
use crate::segment::{SegmentRef, StillSegmentWriter};
use crate::workspace::RenderWorkspace;

const SEGMENT_WEIGHT: f64 = 0.50;
const ASSEMBLY_WEIGHT: f64 = 0.05;
const EXPORT_WEIGHT: f64 = 0.45;

/// Highest blended value reported before the render has returned.
const MAX_PENDING_PROGRESS: f64 = 0.999;

/// Per-render knobs that come from application config rather than the plan.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Root under which each render creates its private workspace.
    pub temp_root: PathBuf,

    pub limits: ExportLimits,

    /// Replaces the mode's export ceiling when set.
    pub timeout_override: Option<Duration>,

    /// Write `<output>.report.json` next to the finished file.
    pub write_report: bool,
}

impl RenderOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            temp_root: config.temp_root(),
            limits: config.export.clone(),
            timeout_override: None,
            write_report: false,
        }
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    pub fn with_report(mut self, write_report: bool) -> Self {
        self.write_report = write_report;
        self
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// One blended progress reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderProgress {
    pub phase: RenderPhase,
    /// Overall completion in `[0, 1]`.
    pub value: f64,
}

/// Callback receiving blended progress.
pub type ProgressCallback = Arc<dyn Fn(RenderProgress) + Send + Sync>;

/// Blends phase progress into one monotonic stream.
struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: Mutex<f64>,
}

impl ProgressReporter {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: Mutex::new(-1.0),
        }
    }

    fn report(&self, phase: RenderPhase, value: f64) {
        self.emit(phase, value.clamp(0.0, MAX_PENDING_PROGRESS));
    }

    fn finish(&self) {
        self.emit(RenderPhase::Cleanup, 1.0);
    }

    fn emit(&self, phase: RenderPhase, value: f64) {
        let Some(callback) = &self.callback else {
            return;
        };
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if value > *last {
            *last = value;
            callback(RenderProgress { phase, value });
        }
    }
}

/// What a successful render hands back.
#[derive(Debug, Clone, Serialize)]
pub struct RenderOutput {
    pub path: PathBuf,

    /// Probed duration of the delivered file.
    pub duration: MediaTime,

    /// Visibility window of each overlay, in descriptor order.
    pub overlay_windows: Vec<TimeRange>,

    /// Effects removed by fast mode, per overlay index.
    pub dropped_effects: Vec<(usize, Vec<&'static str>)>,

    pub timings: PhaseTimings,
    pub peak_memory_bytes: u64,

    /// Frame sampling summary, present when reports are enabled.
    pub report: Option<CompositionReport>,
}

struct Delivered {
    path: PathBuf,
    duration: MediaTime,
    layers: Vec<OverlayLayer>,
    report: Option<CompositionReport>,
}

/// Drives one render at a time against a shared [`RenderContext`].
pub struct Renderer<'a> {
    context: &'a RenderContext,
    monitor: Arc<MemoryMonitor>,
    options: RenderOptions,
}

impl<'a> Renderer<'a> {
    pub fn new(context: &'a RenderContext, monitor: Arc<MemoryMonitor>, options: RenderOptions) -> Self {
        Self {
            context,
            monitor,
            options,
        }
    }

    /// Render `plan` to `output`.
    ///
    /// Holds the context lease for the whole call. Every temporary file is
    /// removed before this returns, whatever the outcome, and also if the
    /// returned future is dropped. On failure nothing is left at `output`.
    pub async fn render(
        &self,
        plan: &RenderPlan,
        config: &RenderConfig,
        output: &Path,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> ReelResult<RenderOutput> {
        let _lease = self.context.lease().await;
        let clock = RenderClock::start();
        let reporter = ProgressReporter::new(progress);
        let mut timings = PhaseTimings::default();
        let mut workspace = None;

        tracing::info!(
            items = plan.items().len(),
            stills = plan.still_count(),
            overlays = plan.overlays().len(),
            audio = plan.audio().is_some(),
            duration_secs = plan.output_duration().as_secs_f64(),
            mode = ?config.mode(),
            preset = %config.preset(),
            output = %output.display(),
            started_at = clock.epoch_wall(),
            "Starting render"
        );

        let result = self
            .run(
                plan,
                config,
                output,
                cancel,
                &reporter,
                &mut timings,
                &mut workspace,
            )
            .await;

        let cleanup_started = Instant::now();
        if let Some(mut workspace) = workspace.take() {
            if let Err(e) = workspace.cleanup() {
                tracing::warn!(
                    dir = %workspace.dir().display(),
                    error = %e,
                    "Failed to remove render workspace"
                );
            }
        }
        timings.record(RenderPhase::Cleanup, cleanup_started.elapsed());

        match result {
            Ok(delivered) => {
                let peak_memory_bytes = self.monitor.peak_bytes();
                tracing::info!(
                    output = %delivered.path.display(),
                    duration_secs = delivered.duration.as_secs_f64(),
                    elapsed_secs = clock.elapsed_secs(),
                    peak_memory_mb = peak_memory_bytes / (1024 * 1024),
                    "Render complete"
                );
                for (phase, elapsed) in timings.iter() {
                    tracing::debug!(phase = %phase, elapsed_ms = elapsed.as_millis() as u64, "Phase timing");
                }
                reporter.finish();
                Ok(RenderOutput {
                    path: delivered.path,
                    duration: delivered.duration,
                    overlay_windows: delivered.layers.iter().map(|l| l.window).collect(),
                    dropped_effects: delivered
                        .layers
                        .iter()
                        .filter(|l| !l.dropped_effects.is_empty())
                        .map(|l| (l.index, l.dropped_effects.clone()))
                        .collect(),
                    timings,
                    peak_memory_bytes,
                    report: delivered.report,
                })
            }
            Err(e) => {
                tracing::warn!(
                    phase = e.phase().map(RenderPhase::as_str).unwrap_or("unknown"),
                    error = %e,
                    elapsed_secs = clock.elapsed_secs(),
                    "Render failed"
                );
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        plan: &RenderPlan,
        config: &RenderConfig,
        output: &Path,
        cancel: &CancellationToken,
        reporter: &ProgressReporter,
        timings: &mut PhaseTimings,
        workspace: &mut Option<RenderWorkspace>,
    ) -> ReelResult<Delivered> {
        reporter.report(RenderPhase::Prepare, 0.0);
        let started = Instant::now();
        self.prepare(plan, config, output).await?;
        let workspace = workspace.insert(RenderWorkspace::create(&self.options.temp_root)?);
        timings.record(RenderPhase::Prepare, started.elapsed());

        let encoder = self.context.encoder().as_ref();

        // Segments, strictly in plan order.
        let started = Instant::now();
        let writer = StillSegmentWriter::new(encoder, config, workspace);
        let total = plan.items().len();
        let mut segments: Vec<SegmentRef> = Vec::with_capacity(total);
        for (index, item) in plan.items().iter().enumerate() {
            self.checkpoint(RenderPhase::Segment, cancel).await?;
            let segment = match item {
                TrackItem::Still(still) => writer.write(index, still).await?,
                TrackItem::Clip(clip) => SegmentRef::for_clip(index, clip),
            };
            segments.push(segment);
            reporter.report(
                RenderPhase::Segment,
                SEGMENT_WEIGHT * (index + 1) as f64 / total as f64,
            );
        }
        timings.record(RenderPhase::Segment, started.elapsed());

        self.checkpoint(RenderPhase::Assemble, cancel).await?;
        let composition: Composition = timings
            .time(
                RenderPhase::Assemble,
                CompositionAssembler::new(encoder, config).assemble(
                    &segments,
                    plan.audio(),
                    plan.output_duration(),
                ),
            )
            .await?;
        reporter.report(RenderPhase::Assemble, SEGMENT_WEIGHT + ASSEMBLY_WEIGHT);

        let started = Instant::now();
        let layers =
            OverlayLayerFactory::new(config).build_all(plan.overlays(), composition.duration);
        timings.record(RenderPhase::Overlay, started.elapsed());

        let mut settings = ExportSettings::for_mode(&self.options.limits, config.mode());
        if let Some(timeout) = self.options.timeout_override {
            settings = settings.with_timeout(timeout);
        }
        let job = ExportJob {
            composition,
            layers,
            config: config.clone(),
            output: workspace.export_path(config.preset().extension()),
        };
        let exporter = Exporter::new(self.context.encoder().clone(), self.monitor.clone(), settings);
        let exported = timings
            .time(
                RenderPhase::Export,
                exporter.export(&job, cancel, |v| {
                    reporter.report(
                        RenderPhase::Export,
                        SEGMENT_WEIGHT + ASSEMBLY_WEIGHT + EXPORT_WEIGHT * v,
                    )
                }),
            )
            .await?;

        let info = encoder.probe(&exported).await.map_err(|e| {
            ReelError::encoding(RenderPhase::Export, format!("exported file unreadable: {e}"))
        })?;
        let expected = plan.output_duration();
        if !within_one_frame(info.duration.as_micros(), expected.as_micros(), config.fps()) {
            return Err(ReelError::encoding(
                RenderPhase::Export,
                format!(
                    "exported duration {} does not match plan duration {}",
                    info.duration, expected
                ),
            ));
        }

        deliver(&exported, output).await?;
        self.monitor.sample_blocking().await;

        let report = if self.options.write_report {
            let report = CompositionReport::build(&job.composition, &job.layers, 1);
            write_report(output, &report).await;
            Some(report)
        } else {
            None
        };

        let ExportJob { layers, .. } = job;
        Ok(Delivered {
            path: output.to_path_buf(),
            duration: info.duration,
            layers,
            report,
        })
    }

    /// Reject anything that would fail later for a reason knowable now.
    async fn prepare(&self, plan: &RenderPlan, config: &RenderConfig, output: &Path) -> ReelResult<()> {
        for (index, item) in plan.items().iter().enumerate() {
            if let TrackItem::Still(still) = item {
                compile_chain(&still.filters).map_err(|e| {
                    let message = match e {
                        ReelError::InvalidPlan { message } => message,
                        other => other.to_string(),
                    };
                    ReelError::invalid_plan(format!("track item {index}: {message}"))
                })?;
            }
        }

        let capabilities = self.context.capabilities().await?;
        if !capabilities.supports(config.preset()) {
            return Err(ReelError::unsupported(format!(
                "backend '{}' cannot encode preset {}",
                capabilities.name,
                config.preset()
            )));
        }

        let sources = plan
            .items()
            .iter()
            .map(|item| item.source_path())
            .chain(plan.audio().map(|audio| audio.path.as_path()))
            .chain(plan.overlays().iter().filter_map(|o| o.image_path()).map(PathBuf::as_path));
        for path in sources {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(ReelError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Stop before starting new work if the caller cancelled or memory is critical.
    async fn checkpoint(&self, phase: RenderPhase, cancel: &CancellationToken) -> ReelResult<()> {
        if cancel.is_cancelled() {
            tracing::info!(phase = %phase, "Render cancellation requested");
            return Err(ReelError::cancelled(phase, CancelReason::Requested));
        }
        if let Some(status) = self.monitor.sample_blocking().await {
            if status.band == PressureBand::Critical {
                tracing::warn!(phase = %phase, used_mb = status.used_mb(), "Critical memory pressure");
                return Err(ReelError::cancelled(phase, CancelReason::MemoryPressure));
            }
        }
        Ok(())
    }
}

/// Move the verified export to its final path.
async fn deliver(from: &Path, to: &Path) -> ReelResult<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems; fall back to copying.
    if let Err(e) = tokio::fs::copy(from, to).await {
        let _ = tokio::fs::remove_file(to).await;
        return Err(ReelError::encoding(
            RenderPhase::Export,
            format!("cannot move export to {}: {e}", to.display()),
        ));
    }
    let _ = tokio::fs::remove_file(from).await;
    Ok(())
}

fn report_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".report.json");
    PathBuf::from(name)
}

async fn write_report(output: &Path, report: &CompositionReport) {
    let path = report_path(output);
    let written = match serde_json::to_vec_pretty(report) {
        Ok(json) => tokio::fs::write(&path, json).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    match written {
        Ok(()) => tracing::info!(path = %path.display(), ok = report.is_ok(), "Wrote composition report"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to write composition report"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting() -> (ProgressReporter, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |p: RenderProgress| {
            sink.lock().unwrap().push(p.value);
        });
        (ProgressReporter::new(Some(callback)), seen)
    }

    #[test]
    fn test_progress_is_monotonic() {
        let (reporter, seen) = collecting();
        reporter.report(RenderPhase::Segment, 0.2);
        reporter.report(RenderPhase::Segment, 0.1);
        reporter.report(RenderPhase::Segment, 0.2);
        reporter.report(RenderPhase::Export, 0.6);
        assert_eq!(*seen.lock().unwrap(), vec![0.2, 0.6]);
    }

    #[test]
    fn test_full_progress_only_on_finish() {
        let (reporter, seen) = collecting();
        reporter.report(RenderPhase::Export, 1.0);
        assert!(seen.lock().unwrap().iter().all(|v| *v < 1.0));
        reporter.finish();
        assert_eq!(seen.lock().unwrap().last().copied(), Some(1.0));
    }

    #[test]
    fn test_phase_weights_sum_to_one() {
        assert!((SEGMENT_WEIGHT + ASSEMBLY_WEIGHT + EXPORT_WEIGHT - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_report_path_appends_suffix() {
        assert_eq!(
            report_path(Path::new("/out/reel.mp4")),
            PathBuf::from("/out/reel.mp4.report.json")
        );
    }

    #[test]
    fn test_options_from_config() {
        let mut config = AppConfig::default();
        config.temp_dir = Some(PathBuf::from("/scratch"));
        config.export.fast_timeout_secs = 5.0;
        let options = RenderOptions::from_config(&config).with_report(true);
        assert_eq!(options.temp_root, PathBuf::from("/scratch"));
        assert_eq!(options.limits.fast_timeout_secs, 5.0);
        assert!(options.write_report);
        assert!(options.timeout_override.is_none());
    }
}

//! ffmpeg/ffprobe backend.
//!
//! Each operation runs one child process. Children are spawned with
//! `kill_on_drop`, so dropping an encode future (timeout, cancellation)
//! terminates the process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use reelsmith_common::error::{ReelError, ReelResult, RenderPhase};
use reelsmith_plan_model::{MediaTime, OutputPreset};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::encoder::{
    EncodeProgress, EncoderCapabilities, ExportJob, MediaEncoder, MediaInfo, StillSegmentJob,
};
use crate::graph::{export_graph, still_segment_graph, FilterGraph, InputSpec};

/// Seconds without progress before a stall warning is logged.
const STALL_WARN_SECS: u64 = 10;

/// Errors from running ffprobe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to start ffprobe: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffprobe failed on {path}: {stderr}")]
    Failed { path: PathBuf, stderr: String },

    #[error("unreadable ffprobe output for {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<ProbeError> for ReelError {
    fn from(e: ProbeError) -> Self {
        ReelError::Other(anyhow::Error::new(e))
    }
}

/// Drives the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEncoder {
    /// Use `ffmpeg` and `ffprobe` from `PATH`.
    pub fn new() -> Self {
        Self::with_binaries("ffmpeg", "ffprobe")
    }

    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn run_ffmpeg(
        &self,
        phase: RenderPhase,
        args: Vec<String>,
        expected: MediaTime,
        total_frames: u64,
        progress: Option<EncodeProgress<'_>>,
    ) -> ReelResult<()> {
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| ReelError::encoding(phase, format!("Failed to start ffmpeg: {e}")))?;

        tracing::debug!(
            pid = child.id(),
            args_len = args.len(),
            total_frames,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::encoding(phase, "Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::encoding(phase, "Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut latest = ProgressState::default();
        let mut last_advance = Instant::now();
        let mut last_out_time = 0.0f64;
        let expected_secs = expected.as_secs_f64();

        while let Some(line) = lines.next_line().await.map_err(|e| {
            ReelError::encoding(phase, format!("Failed reading ffmpeg progress: {e}"))
        })? {
            let trimmed = line.trim();
            let Some((key, value)) = trimmed.split_once('=') else {
                continue;
            };
            latest.update(key, value);
            if key != "progress" {
                continue;
            }
            if latest.out_time_secs > last_out_time + 0.001 {
                last_out_time = latest.out_time_secs;
                last_advance = Instant::now();
            }
            if let Some(cb) = progress {
                cb(latest.fraction(expected_secs));
            }
            if last_advance.elapsed().as_secs() >= STALL_WARN_SECS {
                tracing::warn!(
                    out_time_secs = latest.out_time_secs,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "No ffmpeg progress advancement for 10s"
                );
                last_advance = Instant::now();
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ReelError::encoding(phase, format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(ReelError::encoding(
                phase,
                format!("ffmpeg failed (status {status}): {}", stderr_output.trim()),
            ));
        }

        tracing::debug!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            "ffmpeg finished"
        );
        Ok(())
    }

    async fn run_capture(&self, binary: &Path, args: &[&str]) -> Option<String> {
        let output = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8(output.stdout).ok()
    }
}

#[async_trait::async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn write_still(&self, job: &StillSegmentJob) -> ReelResult<()> {
        let graph = still_segment_graph(job)?;
        let mut args = base_args();
        push_inputs(&mut args, &graph, job.config.fps());
        args.extend(graph_args(&graph));
        args.extend([
            "-frames:v".to_string(),
            graph.total_frames.to_string(),
            "-r".to_string(),
            job.config.fps().to_string(),
        ]);
        args.extend(strings(&[
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-crf",
            "16",
            "-pix_fmt",
            "yuv420p",
            "-an",
        ]));
        args.push(job.output.to_string_lossy().into_owned());

        self.run_ffmpeg(
            RenderPhase::Segment,
            args,
            job.duration,
            graph.total_frames,
            None,
        )
        .await
    }

    async fn probe(&self, path: &Path) -> ReelResult<MediaInfo> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration:stream=codec_type,width,height",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                path: path.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        parse_probe(path, &output.stdout).map_err(Into::into)
    }

    async fn export(&self, job: &ExportJob, progress: EncodeProgress<'_>) -> ReelResult<()> {
        let graph = export_graph(job);
        let fps = job.config.fps();
        let mut args = base_args();
        push_inputs(&mut args, &graph, fps);
        args.extend(graph_args(&graph));
        args.extend(codec_args_for_preset(
            job.config.preset(),
            graph.audio_label.is_some(),
        ));
        args.extend([
            "-r".to_string(),
            fps.to_string(),
            "-t".to_string(),
            format!("{:.6}", graph.duration.as_secs_f64()),
        ]);
        args.push(job.output.to_string_lossy().into_owned());

        tracing::info!(
            inputs = graph.inputs.len(),
            layers = job.layers.len(),
            total_frames = graph.total_frames,
            preset = %job.config.preset(),
            "Starting ffmpeg export"
        );
        self.run_ffmpeg(
            RenderPhase::Export,
            args,
            graph.duration,
            graph.total_frames,
            Some(progress),
        )
        .await
    }

    async fn capabilities(&self) -> ReelResult<EncoderCapabilities> {
        let version = self
            .run_capture(&self.ffmpeg, &["-hide_banner", "-version"])
            .await
            .and_then(|out| parse_version(&out));
        let encoders = self
            .run_capture(&self.ffmpeg, &["-hide_banner", "-encoders"])
            .await
            .ok_or_else(|| ReelError::unsupported("ffmpeg could not list encoders"))?;

        let presets = [
            (OutputPreset::Mp4H264, "libx264"),
            (OutputPreset::Mp4H265, "libx265"),
            (OutputPreset::Webm, "libvpx-vp9"),
        ]
        .into_iter()
        .filter(|(_, codec)| encoders.lines().any(|l| l.split_whitespace().nth(1) == Some(*codec)))
        .map(|(preset, _)| preset)
        .collect();

        Ok(EncoderCapabilities {
            name: "ffmpeg".to_string(),
            version,
            presets,
        })
    }

    async fn is_available(&self) -> bool {
        self.run_capture(&self.ffmpeg, &["-hide_banner", "-version"])
            .await
            .is_some()
            && self
                .run_capture(&self.ffprobe, &["-hide_banner", "-version"])
                .await
                .is_some()
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn base_args() -> Vec<String> {
    strings(&[
        "-hide_banner",
        "-nostats",
        "-loglevel",
        "error",
        "-y",
        "-progress",
        "pipe:1",
    ])
}

fn push_inputs(args: &mut Vec<String>, graph: &FilterGraph, fps: u32) {
    for input in &graph.inputs {
        match input {
            InputSpec::File(path) => {
                args.push("-i".to_string());
                args.push(path.to_string_lossy().into_owned());
            }
            InputSpec::LoopedImage(path) => {
                args.extend(strings(&["-loop", "1", "-framerate"]));
                args.push(fps.to_string());
                args.push("-i".to_string());
                args.push(path.to_string_lossy().into_owned());
            }
            InputSpec::LoopedAudio(path) => {
                args.extend(strings(&["-stream_loop", "-1", "-i"]));
                args.push(path.to_string_lossy().into_owned());
            }
        }
    }
}

fn graph_args(graph: &FilterGraph) -> Vec<String> {
    let mut args = vec![
        "-filter_complex".to_string(),
        graph.filter_complex.clone(),
        "-map".to_string(),
        graph.video_label.clone(),
    ];
    if let Some(audio) = &graph.audio_label {
        args.push("-map".to_string());
        args.push(audio.clone());
    }
    args
}

fn codec_args_for_preset(preset: OutputPreset, with_audio: bool) -> Vec<String> {
    let mut args = match preset {
        OutputPreset::Mp4H264 => strings(&[
            "-c:v",
            "libx264",
            "-preset",
            "medium",
            "-profile:v",
            "high",
            "-crf",
            "20",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]),
        OutputPreset::Mp4H265 => strings(&[
            "-c:v",
            "libx265",
            "-preset",
            "medium",
            "-crf",
            "24",
            "-tag:v",
            "hvc1",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]),
        OutputPreset::Webm => strings(&[
            "-c:v",
            "libvpx-vp9",
            "-crf",
            "32",
            "-b:v",
            "0",
            "-row-mt",
            "1",
            "-pix_fmt",
            "yuv420p",
        ]),
    };
    if !with_audio {
        args.push("-an".to_string());
        return args;
    }
    match preset {
        OutputPreset::Mp4H264 | OutputPreset::Mp4H265 => {
            args.extend(strings(&["-c:a", "aac", "-b:a", "192k"]))
        }
        OutputPreset::Webm => args.extend(strings(&["-c:a", "libopus", "-b:a", "128k"])),
    }
    args
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe(path: &Path, raw: &[u8]) -> Result<MediaInfo, ProbeError> {
    let parsed: ProbeOutput = serde_json::from_slice(raw).map_err(|e| ProbeError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .map(MediaTime::from_secs_f64)
        .unwrap_or(MediaTime::ZERO);

    Ok(MediaInfo {
        duration,
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        has_video: video.is_some(),
        has_audio,
    })
}

fn parse_version(output: &str) -> Option<String> {
    let line = output.lines().next()?;
    let rest = line.strip_prefix("ffmpeg version ")?;
    rest.split_whitespace().next().map(str::to_string)
}

/// Latest values from ffmpeg's `-progress` key/value stream.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, ffmpeg reports out_time_ms in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_secs: f64) -> f64 {
        if self.complete {
            return 1.0;
        }
        if expected_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / expected_secs).clamp(0.0, 1.0)
    }
}

//! Reelsmith Render Engine
//!
//! Turns a validated [`RenderPlan`](reelsmith_plan_model::RenderPlan) into one
//! exported video file: stills become timed segments, segments and audio are
//! laid out on a timeline, overlays are composited during the final encode.
//!
//! # Pipeline Architecture
//!
//! ```text
//! still.jpg ── Still Segment Writer ──► segment-0000.mp4 ──┐
//! clip.mp4 ────────────────────────────────────────────────┤
//!                                                           ├── Composition Assembler
//! music.m4a ────────────────────────── loop / truncate ────┘        │
//!                                                                    ├── Overlay Layers
//! overlays ──────────── Overlay Layer Factory ──────────────────────┘        │
//!                                                                             ▼
//!                                                           Exporter (timeout, cancel,
//!                                                                     memory monitor)
//!                                                                             │
//!                                                                             ▼
//!                                                                        output.mp4
//! ```
//!
//! The [`Renderer`] drives these phases in order and owns every temporary
//! file under a per-render [`RenderWorkspace`]. Native work goes through the
//! [`MediaEncoder`] trait; [`FfmpegEncoder`] is the production backend.

pub mod assembler;
pub mod compositor;
pub mod context;
pub mod encoder;
pub mod export;
pub mod ffmpeg;
pub mod filters;
pub mod graph;
pub mod monitor;
pub mod overlay;
pub mod renderer;
pub mod segment;
pub mod workspace;

pub use assembler::{
    aspect_fit, AudioLoops, AudioTrack, Composition, CompositionAssembler, FitInstruction,
};
pub use compositor::{compute_compositions, CompositionReport, FrameComposition};
pub use context::{RenderContext, RenderLease};
pub use encoder::{EncoderCapabilities, ExportJob, MediaEncoder, MediaInfo, StillSegmentJob};
pub use export::{ExportSettings, ExportState, Exporter};
pub use ffmpeg::FfmpegEncoder;
pub use monitor::{MemoryMonitor, MemoryProbe, MemoryStatus, PhaseTimings, PressureBand};
pub use overlay::{OverlayLayer, OverlayLayerFactory};
pub use renderer::{ProgressCallback, RenderOptions, RenderOutput, RenderProgress, Renderer};
pub use segment::{SegmentRef, SegmentSource, StillSegmentWriter};
pub use workspace::RenderWorkspace;

//! Render a plan to a video file.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Args;
use reelsmith_common::clock::{ProgressThrottle, RenderClock};
use reelsmith_common::config::AppConfig;
use reelsmith_plan_model::{OutputPreset, RenderConfig, RenderMode};
use reelsmith_render_engine::export::timeout_from_secs;
use reelsmith_render_engine::{
    FfmpegEncoder, MemoryMonitor, ProgressCallback, RenderContext, RenderOptions, RenderProgress,
    Renderer,
};
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct RenderArgs {
    /// Path to the plan JSON
    plan: PathBuf,

    /// Output file path (defaults to <output_dir>/<plan name>.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Fast mode: cheaper overlay animation and a shorter export ceiling
    #[arg(long)]
    fast: bool,

    /// Richer easing and beat-synced motion
    #[arg(long)]
    premium: bool,

    /// Output width
    #[arg(long)]
    width: Option<u32>,

    /// Output height
    #[arg(long)]
    height: Option<u32>,

    /// Output frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Beat tempo for synced effects (0 disables)
    #[arg(long)]
    bpm: Option<f64>,

    /// Output preset: mp4-h264, mp4-h265, webm
    #[arg(long)]
    preset: Option<String>,

    /// Override the export wall-clock ceiling
    #[arg(long)]
    timeout_secs: Option<f64>,

    /// Write a frame composition report next to the output
    #[arg(long)]
    report: bool,

    /// Print the render result as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: RenderArgs, app: &AppConfig) -> anyhow::Result<()> {
    let plan = super::load_plan(&args.plan)?;

    let defaults = &app.render;
    let preset: OutputPreset = args
        .preset
        .as_deref()
        .unwrap_or(defaults.preset.as_str())
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let config = RenderConfig::builder()
        .size(
            args.width.unwrap_or(defaults.width),
            args.height.unwrap_or(defaults.height),
        )
        .fps(args.fps.unwrap_or(defaults.fps))
        .premium(args.premium || defaults.premium)
        .bpm(args.bpm.unwrap_or(defaults.bpm))
        .preset(preset)
        .mode(if args.fast {
            RenderMode::Fast
        } else {
            RenderMode::Full
        })
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid render settings: {e}"))?;

    let output = args.output.unwrap_or_else(|| {
        let stem = args
            .plan
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reel".to_string());
        app.output_dir
            .join(format!("{stem}.{}", preset.extension()))
    });

    println!("Rendering plan: {}", args.plan.display());
    println!("  Output: {}", output.display());
    println!(
        "  Resolution: {}x{} @ {}fps ({preset}, {:?})",
        config.width(),
        config.height(),
        config.fps(),
        config.mode()
    );
    println!(
        "  Items: {} ({} stills), overlays: {}, duration: {:.1}s",
        plan.items().len(),
        plan.still_count(),
        plan.overlays().len(),
        plan.output_duration().as_secs_f64()
    );

    let mut options = RenderOptions::from_config(app).with_report(args.report);
    if let Some(secs) = args.timeout_secs {
        if !secs.is_finite() || secs <= 0.0 {
            anyhow::bail!("--timeout-secs must be positive");
        }
        options = options.with_timeout(timeout_from_secs(secs));
    }

    let context = RenderContext::new(Arc::new(FfmpegEncoder::new()));
    let monitor = Arc::new(MemoryMonitor::system(app.memory.clone()));
    let renderer = Renderer::new(&context, monitor, options);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received; cancelling render");
            on_ctrl_c.cancel();
        }
    });

    let clock = RenderClock::start();
    let throttle = Mutex::new(ProgressThrottle::new(250, 0.02));
    let progress: ProgressCallback = Arc::new(move |p: RenderProgress| {
        let Ok(mut throttle) = throttle.lock() else {
            return;
        };
        if p.value >= 1.0 || throttle.should_emit(clock.elapsed_ms(), p.value) {
            print!("\r  Progress: {:>5.1}% ({:<8})", p.value * 100.0, p.phase.as_str());
            let _ = std::io::stdout().flush();
        }
    });

    match renderer
        .render(&plan, &config, &output, &cancel, Some(progress))
        .await
    {
        Ok(result) => {
            println!();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            println!("Render complete: {}", result.path.display());
            println!("  Duration: {:.2}s", result.duration.as_secs_f64());
            println!(
                "  Peak memory: {} MB",
                result.peak_memory_bytes / (1024 * 1024)
            );
            for (phase, elapsed) in result.timings.iter() {
                println!("  {:<9} {:>8.2}s", phase.as_str(), elapsed.as_secs_f64());
            }
            for (index, dropped) in &result.dropped_effects {
                println!("  Overlay {index}: fast mode dropped {}", dropped.join(", "));
            }
            Ok(())
        }
        Err(e) => {
            println!();
            if e.is_cancellation() {
                println!("Render stopped: {e}");
            }
            Err(anyhow::anyhow!("Render failed: {e}"))
        }
    }
}

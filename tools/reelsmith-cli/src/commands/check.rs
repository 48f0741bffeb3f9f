//! Check encoder availability and memory status.

use reelsmith_common::config::AppConfig;
use reelsmith_render_engine::{FfmpegEncoder, MediaEncoder, MemoryMonitor, PressureBand};

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Reelsmith System Check");
    println!("{}", "=".repeat(50));

    let encoder = FfmpegEncoder::new();
    let ready = encoder.is_available().await;
    if ready {
        match encoder.capabilities().await {
            Ok(caps) => {
                println!(
                    "[OK] Encoder: {} {}",
                    caps.name,
                    caps.version.as_deref().unwrap_or("(unknown version)")
                );
                let presets: Vec<&str> = caps.presets.iter().map(|p| p.as_str()).collect();
                println!("     Presets: {}", presets.join(", "));
            }
            Err(e) => println!("[WARN] Encoder found but capability probe failed: {e}"),
        }
    } else {
        println!("[FAIL] Encoder: ffmpeg/ffprobe not found on PATH");
    }

    let monitor = MemoryMonitor::system(config.memory.clone());
    match monitor.sample() {
        Some(status) => {
            let tag = match status.band {
                PressureBand::Normal => "[OK]",
                PressureBand::Elevated => "[WARN]",
                PressureBand::Critical => "[FAIL]",
            };
            println!(
                "{tag} Memory: {:.0} MB in use ({:?}; elevated at {} MB, critical at {} MB)",
                status.used_mb(),
                status.band,
                config.memory.elevated_mb,
                config.memory.critical_mb
            );
        }
        None => println!("[WARN] Memory: unable to read process memory"),
    }

    println!("[OK] Temp root: {}", config.temp_root().display());
    println!(
        "[OK] Export ceilings: fast {:.0}s, full {:.0}s (poll every {} ms)",
        config.export.fast_timeout_secs,
        config.export.full_timeout_secs,
        config.export.poll_interval_ms
    );

    println!();
    if ready {
        println!("Reelsmith is ready to render.");
    } else {
        println!("Install ffmpeg to render. See above for details.");
    }

    Ok(())
}

//! Show plan contents and timing.

use std::path::PathBuf;

use reelsmith_plan_model::{OverlayContent, TrackItem};

pub fn run(plan_path: PathBuf) -> anyhow::Result<()> {
    let plan = super::load_plan(&plan_path)?;

    println!("Plan: {}", plan_path.display());
    println!(
        "  Duration: {:.2}s ({} items, {} stills)",
        plan.output_duration().as_secs_f64(),
        plan.items().len(),
        plan.still_count()
    );
    println!();

    println!("Timeline:");
    for (index, item) in plan.items().iter().enumerate() {
        let range = item.range();
        print!(
            "  [{index:>2}] {:>6.2}s - {:>6.2}s  {:<5} {}",
            range.start.as_secs_f64(),
            range.end().as_secs_f64(),
            item.kind(),
            item.source_path().display()
        );
        if let TrackItem::Still(still) = item {
            let names: Vec<&str> = still.filters.iter().map(|f| f.name.as_str()).collect();
            if !names.is_empty() {
                print!("  filters: {}", names.join(", "));
            }
            if !still.transform.is_identity() {
                print!("  transformed");
            }
            if still.motion.is_some() {
                print!("  pan/zoom");
            }
        }
        println!();
    }
    println!();

    match plan.audio() {
        Some(audio) => println!(
            "Audio: {} (volume {:.2})",
            audio.path.display(),
            audio.volume
        ),
        None => println!("Audio: none"),
    }
    println!();

    println!("Overlays:");
    if plan.overlays().is_empty() {
        println!("  none");
    }
    for (index, overlay) in plan.overlays().iter().enumerate() {
        let window = overlay.window();
        let label = match &overlay.content {
            OverlayContent::Text(text) => format!("\"{}\"", text.text),
            OverlayContent::Sticker(sticker) => sticker.image.display().to_string(),
            OverlayContent::Branding(branding) => branding
                .text
                .clone()
                .or_else(|| branding.image.as_ref().map(|p| p.display().to_string()))
                .unwrap_or_default(),
        };
        println!(
            "  [{index:>2}] {:>6.2}s - {:>6.2}s  {:<8} {label}",
            window.start.as_secs_f64(),
            window.end().as_secs_f64(),
            overlay.kind()
        );
    }

    Ok(())
}

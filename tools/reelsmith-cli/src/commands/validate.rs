//! Validate a render plan.

use std::path::PathBuf;

use reelsmith_plan_model::TrackItem;
use reelsmith_render_engine::filters::compile_chain;

pub fn run(plan_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating plan at: {}", plan_path.display());

    let plan = super::load_plan(&plan_path)?;

    println!("  Items: {}", plan.items().len());
    println!("  Overlays: {}", plan.overlays().len());
    println!("  Duration: {:.2}s", plan.output_duration().as_secs_f64());

    let mut issues = Vec::new();
    for (index, item) in plan.items().iter().enumerate() {
        if let TrackItem::Still(still) = item {
            if let Err(e) = compile_chain(&still.filters) {
                issues.push(format!("item {index}: {e}"));
            }
        }
        if !item.source_path().exists() {
            issues.push(format!(
                "item {index}: missing {} {}",
                item.kind(),
                item.source_path().display()
            ));
        }
    }
    if let Some(audio) = plan.audio() {
        if !audio.path.exists() {
            issues.push(format!("audio: missing {}", audio.path.display()));
        }
    }
    for (index, overlay) in plan.overlays().iter().enumerate() {
        if let Some(image) = overlay.image_path() {
            if !image.exists() {
                issues.push(format!("overlay {index}: missing {}", image.display()));
            }
        }
    }

    if issues.is_empty() {
        println!("  Sources: All present");
        println!("\nPlan is valid.");
        Ok(())
    } else {
        println!("\nValidation issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
        anyhow::bail!("{} issue(s) found", issues.len())
    }
}

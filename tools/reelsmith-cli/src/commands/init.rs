//! Write a sample render plan.

use std::path::PathBuf;

use reelsmith_plan_model::{
    AudioSource, BrandingOverlay, Corner, Entrance, FilterSpec, MediaTime, Overlay,
    OverlayContent, PanZoom, Point2D, RenderPlan, TextOverlay, Transform2D,
};

pub fn run(path: PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let secs = MediaTime::from_secs_f64;
    let plan = RenderPlan::builder()
        .still_with(
            "photos/01.jpg",
            secs(2.5),
            vec![FilterSpec::new("warm").with_number("amount", 0.3)],
            Transform2D::IDENTITY,
            Some(PanZoom::push_in(1.15)),
        )
        .still_with(
            "photos/02.jpg",
            secs(2.5),
            vec![
                FilterSpec::new("contrast").with_number("amount", 1.1),
                FilterSpec::new("vignette"),
            ],
            Transform2D::IDENTITY,
            None,
        )
        .clip("clips/plating.mp4", secs(3.0))
        .still("photos/03.jpg", secs(2.0))
        .audio(AudioSource::new("audio/track.m4a"))
        .overlay(Overlay::caption(0.3, 2.0, "Tonight's special"))
        .overlay(Overlay::new(
            secs(5.0),
            secs(3.0),
            OverlayContent::Text(TextOverlay {
                text: "Fresh from the kitchen".to_string(),
                size: 0.04,
                color: "#FFFFFF".parse()?,
                position: Point2D::new(0.5, 0.85),
                background: Some("#000000A0".parse()?),
                shadow: true,
                entrance: Entrance::SlideUp,
            }),
        ))
        .overlay(Overlay::new(
            MediaTime::ZERO,
            secs(10.0),
            OverlayContent::Branding(BrandingOverlay {
                text: Some("@reelsmith".to_string()),
                image: None,
                corner: Corner::BottomRight,
                opacity: 0.8,
            }),
        ))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build sample plan: {e}"))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    plan.save(&path)
        .map_err(|e| anyhow::anyhow!("Failed to write plan: {e}"))?;

    println!("Sample plan written to {}", path.display());
    println!("  Items: {} ({:.1}s)", plan.items().len(), plan.output_duration().as_secs_f64());
    println!("  Overlays: {}", plan.overlays().len());
    println!();
    println!("Media paths are relative to the plan file:");
    println!("  photos/01.jpg, photos/02.jpg, photos/03.jpg");
    println!("  clips/plating.mp4");
    println!("  audio/track.m4a");

    Ok(())
}

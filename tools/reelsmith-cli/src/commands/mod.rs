pub mod check;
pub mod info;
pub mod init;
pub mod render;
pub mod validate;

use std::path::{Path, PathBuf};

use reelsmith_plan_model::RenderPlan;

/// Load a plan and resolve its media paths against the plan's directory.
pub fn load_plan(path: &Path) -> anyhow::Result<RenderPlan> {
    let plan = RenderPlan::load(path).map_err(|e| anyhow::anyhow!("Failed to load plan: {e}"))?;
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(plan.resolve_paths(&base))
}

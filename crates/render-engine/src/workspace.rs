//! Per-render scratch directory.

use std::path::{Path, PathBuf};

use reelsmith_common::error::ReelResult;

/// A private temp directory for one render, namespaced by a UUID.
///
/// Everything a render writes before the final move lives here. The
/// directory is removed by [`RenderWorkspace::cleanup`] or, failing that,
/// when the value is dropped (including when the render future is dropped).
#[derive(Debug)]
pub struct RenderWorkspace {
    id: uuid::Uuid,
    dir: PathBuf,
    removed: bool,
}

impl RenderWorkspace {
    /// Create `root/render-<uuid>`.
    pub fn create(root: &Path) -> ReelResult<Self> {
        let id = uuid::Uuid::new_v4();
        let dir = root.join(format!("render-{id}"));
        std::fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "Created render workspace");
        Ok(Self {
            id,
            dir,
            removed: false,
        })
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for the segment rendered from track item `index`.
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("segment-{index:04}.mp4"))
    }

    /// Path the final encode is written to before it is moved out.
    pub fn export_path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("export.{extension}"))
    }

    /// Remove the directory and everything in it.
    pub fn cleanup(&mut self) -> ReelResult<()> {
        if self.removed {
            return Ok(());
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.removed = true;
        tracing::debug!(dir = %self.dir.display(), "Removed render workspace");
        Ok(())
    }
}

impl Drop for RenderWorkspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(
                error = %e,
                dir = %self.dir.display(),
                "Failed to remove render workspace"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let dir = {
            let workspace = RenderWorkspace::create(root.path()).unwrap();
            std::fs::write(workspace.segment_path(0), b"x").unwrap();
            workspace.dir().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn test_explicit_cleanup_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = RenderWorkspace::create(root.path()).unwrap();
        assert!(workspace.dir().exists());
        workspace.cleanup().unwrap();
        workspace.cleanup().unwrap();
        assert!(!workspace.dir().exists());
    }

    #[test]
    fn test_workspaces_are_distinct() {
        let root = tempfile::tempdir().unwrap();
        let a = RenderWorkspace::create(root.path()).unwrap();
        let b = RenderWorkspace::create(root.path()).unwrap();
        assert_ne!(a.dir(), b.dir());
        assert_eq!(
            a.segment_path(3).file_name().unwrap().to_str().unwrap(),
            "segment-0003.mp4"
        );
    }
}

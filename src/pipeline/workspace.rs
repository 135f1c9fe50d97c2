//! Per-request scratch directories.
//!
//! ## Why `TempDir`?
//!
//! Each request gets a fresh, uniquely named directory created with
//! `O_EXCL` semantics by [`tempfile`], so two concurrent requests can never
//! share one. The `TempDir` inside [`Workspace`] is also a drop guard: if the
//! pipeline future is dropped or a stage panics, the directory is still
//! removed. The normal path calls [`WorkspaceManager::close`] explicitly so
//! that removal errors are logged instead of silently ignored.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const WORKSPACE_PREFIX: &str = "usdz2glb-";
const OUTPUT_DIR: &str = "out";

/// Allocates and tears down [`Workspace`]s.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceManager {
    root: Option<PathBuf>,
}

impl WorkspaceManager {
    /// Workspaces are created under `root`, or the system temp directory.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Allocate a fresh, empty workspace. The directory work runs on the
    /// blocking pool, like [`close`](Self::close).
    pub async fn open(&self) -> std::io::Result<Workspace> {
        let root = self.root.clone();
        let dir = tokio::task::spawn_blocking(move || create_dir(root.as_deref()))
            .await
            .map_err(std::io::Error::other)??;

        debug!("Opened workspace {}", dir.path().display());
        Ok(Workspace { dir })
    }

    /// Remove the workspace and everything in it.
    ///
    /// Never fails: a removal error is logged and otherwise ignored, so it
    /// cannot change the outcome of the request that owned the workspace.
    pub async fn close(&self, workspace: Workspace) {
        let path = workspace.path().to_path_buf();
        let result = tokio::task::spawn_blocking(move || workspace.dir.close()).await;
        match result {
            Ok(Ok(())) => debug!("Removed workspace {}", path.display()),
            Ok(Err(e)) => warn!("Failed to remove workspace {}: {}", path.display(), e),
            Err(e) => warn!("Workspace cleanup task for {} failed: {}", path.display(), e),
        }
    }
}

fn create_dir(root: Option<&Path>) -> std::io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(WORKSPACE_PREFIX);
    let dir = match root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)?
        }
        None => builder.tempdir()?,
    };
    std::fs::create_dir(dir.path().join(OUTPUT_DIR))?;
    Ok(dir)
}

/// An exclusively owned scratch directory for one request.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Tag a path inside this workspace with its pipeline stage.
    ///
    /// `file_name` must be a bare file name; callers only pass names produced
    /// by request validation. Outputs land in the `out/` subdirectory.
    pub fn stage(&self, stage: AssetStage, file_name: &str) -> StagedAsset<'_> {
        let path = match stage {
            AssetStage::Output => self.dir.path().join(OUTPUT_DIR).join(file_name),
            AssetStage::Input | AssetStage::Intermediate => self.dir.path().join(file_name),
        };
        StagedAsset {
            path,
            stage,
            _workspace: PhantomData,
        }
    }
}

/// Where a staged file sits in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStage {
    /// The acquired `.usdz` archive.
    Input,
    /// The scene description written by step 1.
    Intermediate,
    /// The GLB written by step 2.
    Output,
}

/// A file inside a [`Workspace`]. Borrowing the workspace ties the asset's
/// lifetime to it: the compiler rejects any use after the workspace closes.
#[derive(Debug)]
pub struct StagedAsset<'ws> {
    path: PathBuf,
    stage: AssetStage,
    _workspace: PhantomData<&'ws Workspace>,
}

impl<'ws> StagedAsset<'ws> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stage(&self) -> AssetStage {
        self.stage
    }

    /// The asset the next stage derives from this one by swapping the
    /// extension, in the same directory.
    pub fn with_extension(&self, stage: AssetStage, ext: &str) -> StagedAsset<'ws> {
        StagedAsset {
            path: self.path.with_extension(ext),
            stage,
            _workspace: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_and_close_under_root() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(Some(root.path().to_path_buf()));

        let ws = manager.open().await.unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.starts_with(root.path()));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(WORKSPACE_PREFIX));
        assert!(path.join(OUTPUT_DIR).is_dir());

        std::fs::write(path.join("model.usdz"), b"PK").unwrap();
        std::fs::write(path.join(OUTPUT_DIR).join("model.glb"), b"glTF").unwrap();

        manager.close(ws).await;
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn workspaces_are_distinct() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(Some(root.path().to_path_buf()));
        let a = manager.open().await.unwrap();
        let b = manager.open().await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn dropping_workspace_removes_it() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(Some(root.path().to_path_buf()));
        let ws = manager.open().await.unwrap();
        let path = ws.path().to_path_buf();
        drop(ws);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn open_creates_missing_root() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("nested/workspaces");
        let manager = WorkspaceManager::new(Some(root.clone()));

        let ws = manager.open().await.unwrap();
        assert!(ws.path().starts_with(&root));
        manager.close(ws).await;
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn open_under_file_fails() {
        let base = tempfile::tempdir().unwrap();
        let file = base.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let manager = WorkspaceManager::new(Some(file));
        assert!(manager.open().await.is_err());
    }

    #[tokio::test]
    async fn staged_paths() {
        let manager = WorkspaceManager::default();
        let ws = manager.open().await.unwrap();

        let input = ws.stage(AssetStage::Input, "model.usdz");
        assert_eq!(input.path(), ws.path().join("model.usdz"));
        assert_eq!(input.stage(), AssetStage::Input);

        let intermediate = input.with_extension(AssetStage::Intermediate, "usd");
        assert_eq!(intermediate.path(), ws.path().join("model.usd"));

        let output = ws.stage(AssetStage::Output, "model.usd");
        assert_eq!(output.path(), ws.path().join("out").join("model.usd"));
        assert_ne!(output.path(), intermediate.path());
    }
}

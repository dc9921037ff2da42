//! Scoped temporary directory holding one run's dump output.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tracing::{debug, info, warn};

const WORKSPACE_PREFIX: &str = "mongo-migrate-";

/// Per-run dump directory. Removed by [`close`](Self::close) or on drop,
/// whichever comes first. A failed removal is logged, never returned.
#[derive(Debug)]
pub struct DumpWorkspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl DumpWorkspace {
    /// Create a fresh directory under `parent`, or the system temp dir.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        info!("Dump workspace: {}", path.display());

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now.
    pub fn close(mut self) {
        self.cleanup();
    }

    /// Remove a workspace directory by path, for exit paths that skip
    /// destructors. A missing directory is not an error.
    pub fn remove_path(path: &Path) {
        match std::fs::remove_dir_all(path) {
            Ok(()) => info!("Removed dump workspace {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove dump workspace {}: {}", path.display(), e),
        }
    }

    fn cleanup(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => debug!("Removed dump workspace {}", self.path.display()),
            Err(e) => warn!(
                "Failed to remove dump workspace {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for DumpWorkspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_removes_directory() {
        let parent = TempDir::new().unwrap();
        let workspace = DumpWorkspace::create(Some(parent.path())).unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::create_dir_all(path.join("shop")).unwrap();
        std::fs::write(path.join("shop").join("users.bson"), b"data").unwrap();
        assert!(path.starts_with(parent.path()));

        workspace.close();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let parent = TempDir::new().unwrap();
        let path = {
            let workspace = DumpWorkspace::create(Some(&parent.path().join("nested"))).unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
        assert!(parent.path().join("nested").exists());
    }

    #[test]
    fn test_remove_path_without_unwinding() {
        let parent = TempDir::new().unwrap();
        let workspace = DumpWorkspace::create(Some(parent.path())).unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::create_dir_all(path.join("shop")).unwrap();
        std::fs::write(path.join("shop").join("orders.bson"), b"partial").unwrap();

        DumpWorkspace::remove_path(&path);
        assert!(!path.exists());
        DumpWorkspace::remove_path(&path);
        workspace.close();
    }

    #[test]
    fn test_directory_already_gone_is_not_an_error() {
        let workspace = DumpWorkspace::create(None).unwrap();
        std::fs::remove_dir_all(workspace.path()).unwrap();
        workspace.close();
    }
}

//! Scoped scratch directories

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::models::AppResult;

/// Temporary directory owned by exactly one download
///
/// Removed by [`DownloadWorkspace::close`], or on drop if `close` was never
/// reached. Removal failures are logged, never returned.
#[derive(Debug)]
pub struct DownloadWorkspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl DownloadWorkspace {
    /// Creates `<temp_root>/<prefix>XXXXXX`
    pub fn create(temp_root: &Path, prefix: &str) -> AppResult<Self> {
        std::fs::create_dir_all(temp_root)?;
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(temp_root)?;
        let path = dir.path().to_path_buf();
        tracing::debug!("Created workspace {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.file(&format!("segment_{index:06}.ts"))
    }

    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => tracing::debug!("Removed workspace {}", self.path.display()),
                Err(e) => tracing::warn!(
                    "Failed to remove workspace {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for DownloadWorkspace {
    fn drop(&mut self) {
        self.remove();
    }
}

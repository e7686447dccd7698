use std::path::{Path, PathBuf};

/// Liveness marker for workers: the runner touches this file once per poll so
/// an external probe can flag a hung process by mtime age.
#[derive(Debug, Clone)]
pub struct Healthbeat {
    path: PathBuf,
}

impl Healthbeat {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Updates the file's mtime, creating parent directories on first touch.
    /// Failures are logged and swallowed; a broken probe must not stop the
    /// worker.
    pub async fn touch(&self) {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(path = %self.path.display(), error = %err, "could not create healthbeat dir");
                return;
            }
        }
        if let Err(err) = tokio::fs::write(&self.path, b"").await {
            tracing::warn!(path = %self.path.display(), error = %err, "could not touch healthbeat file");
        }
    }
}

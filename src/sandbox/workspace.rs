use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use uuid::Uuid;

const PREFIX: &str = "code-execution-";

/// A per-execution scratch directory, removed when the execution is over.
///
/// `destroy` is the normal exit. If the owning future is dropped first (for
/// instance because the client went away), `Drop` removes the directory
/// synchronously instead.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    armed: bool,
}

impl Workspace {
    pub async fn create(root: &Path) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("failed to create workspace root {}", root.display()))?;

        let session_id = Uuid::new_v4();
        let path = root.join(format!("{PREFIX}{session_id}"));
        tokio::fs::create_dir(&path)
            .await
            .with_context(|| format!("failed to create workspace {}", path.display()))?;

        tracing::debug!(workspace = %path.display(), "workspace created");
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn destroy(mut self) {
        self.armed = false;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => tracing::debug!(workspace = %self.path.display(), "workspace removed"),
            Err(err) => log_cleanup_error(&self.path, &err),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = std::fs::remove_dir_all(&self.path)
        {
            log_cleanup_error(&self.path, &err);
        }
    }
}

fn log_cleanup_error(path: &Path, err: &io::Error) {
    if err.kind() != io::ErrorKind::NotFound {
        tracing::warn!(workspace = %path.display(), error = %err, "workspace cleanup failed");
    }
}

/// Runs `f` inside a fresh workspace under `root` and removes the workspace
/// afterwards, whatever `f` returned. Cleanup failures are logged only.
pub async fn with_workspace<F, Fut, T>(root: &Path, f: F) -> anyhow::Result<T>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let workspace = Workspace::create(root).await?;
    let result = f(workspace.path().to_path_buf()).await;
    workspace.destroy().await;
    result
}

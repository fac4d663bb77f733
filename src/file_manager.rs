// src/file_manager.rs - Disk-backed staging for downloaded jobs
use async_trait::async_trait;
use autodrop_shared::{FileStaging, StagingError, STAGING_NAMESPACE};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Stages files under a root directory that backs the `local` namespace.
#[derive(Debug, Clone)]
pub struct DiskStaging {
    root: PathBuf,
}

impl DiskStaging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a namespaced path to a location under the root, refusing escapes.
    pub fn resolve(&self, namespace: &str, path: &str) -> Result<PathBuf, StagingError> {
        if namespace != STAGING_NAMESPACE {
            return Err(StagingError::UnknownNamespace(namespace.to_string()));
        }
        let relative = Path::new(path.trim_start_matches('/'));
        let safe = !relative.as_os_str().is_empty()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StagingError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StagingError {
    StagingError::Io(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl FileStaging for DiskStaging {
    async fn write(
        &self,
        namespace: &str,
        path: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<String, StagingError> {
        let target = self.resolve(namespace, path)?;
        if !overwrite && fs::try_exists(&target).await.unwrap_or(false) {
            return Err(StagingError::AlreadyExists(path.to_string()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(parent, e))?;
        }
        // Write beside the target and rename, so a failed write never leaves a partial job.
        let partial = target.with_extension("gcode.part");
        if let Err(e) = fs::write(&partial, bytes).await {
            let _ = fs::remove_file(&partial).await;
            return Err(io_error(&partial, e));
        }
        if let Err(e) = fs::rename(&partial, &target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(io_error(&target, e));
        }
        tracing::info!("Staged {} bytes at {}", bytes.len(), target.display());
        Ok(path.trim_start_matches('/').to_string())
    }

    async fn remove(&self, namespace: &str, path: &str) -> Result<(), StagingError> {
        let target = self.resolve(namespace, path)?;
        match fs::remove_file(&target).await {
            Ok(()) => {
                tracing::info!("Removed staged file {}", target.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StagingError::NotFound(path.to_string())),
            Err(e) => Err(io_error(&target, e)),
        }
    }
}

// Local file staging seam (the host's file manager).
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StagingError {
    #[error("Unknown storage namespace: {0}")]
    UnknownNamespace(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("File already exists: {0}")]
    AlreadyExists(String),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(String),
}

#[async_trait]
pub trait FileStaging: Send + Sync {
    /// Store `bytes` at `path` inside `namespace`, returning the stored path.
    ///
    /// A failed write must leave nothing behind at `path`.
    async fn write(
        &self,
        namespace: &str,
        path: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<String, StagingError>;

    async fn remove(&self, namespace: &str, path: &str) -> Result<(), StagingError>;
}

// src/snapshot.rs - Webcam snapshot capture for status reports
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::time::Duration;
use thiserror::Error;

use crate::config::WebcamConfig;

/// 1x1 grey PNG sent when no camera image is available.
pub const NO_CAMERA_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAAAAAA6fptVAAAACklEQVR4nGNoAAAAggCBd81ytgAAAABJRU5ErkJggg==";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Snapshot returned an empty image")]
    Empty,
}

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn capture(&self, url: &str, timeout: Duration, validate_tls: bool) -> Result<Vec<u8>, SnapshotError>;
}

/// Fetches snapshots over HTTP(S).
#[derive(Debug, Default, Clone)]
pub struct HttpSnapshot;

#[async_trait]
impl SnapshotProvider for HttpSnapshot {
    async fn capture(&self, url: &str, timeout: Duration, validate_tls: bool) -> Result<Vec<u8>, SnapshotError> {
        tracing::debug!("Capturing snapshot from {}", url);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!validate_tls)
            .build()?;
        let bytes = client.get(url).send().await?.error_for_status()?.bytes().await?;
        if bytes.is_empty() {
            return Err(SnapshotError::Empty);
        }
        Ok(bytes.to_vec())
    }
}

pub fn image_data_url(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

pub fn placeholder_data_url() -> String {
    format!("data:image/png;base64,{}", NO_CAMERA_PNG_BASE64)
}

/// Capture the configured webcam as a data URL; any failure yields the placeholder.
pub async fn snapshot_data_url(provider: &dyn SnapshotProvider, webcam: &WebcamConfig) -> String {
    let url = webcam.snapshot.trim();
    if url.is_empty() {
        return placeholder_data_url();
    }
    let timeout = Duration::from_secs(webcam.snapshot_timeout.max(1));
    match provider.capture(url, timeout, webcam.snapshot_ssl_validation).await {
        Ok(bytes) => image_data_url(&bytes),
        Err(e) => {
            tracing::warn!("Could not capture snapshot from {}: {}", url, e);
            placeholder_data_url()
        }
    }
}

use crate::error::{FacelightError, Result};
use crate::pipeline::FrameSource;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tracing::{debug, info};

/// Serves a JPEG file from disk as the current camera frame
pub struct StillImageFrameSource {
    path: PathBuf,
    front_facing: AtomicBool,
}

impl StillImageFrameSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            front_facing: AtomicBool::new(true),
        }
    }

    pub fn is_front_facing(&self) -> bool {
        self.front_facing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for StillImageFrameSource {
    async fn request_permission(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn capture_still(&self) -> Result<Bytes> {
        let data = fs::read(&self.path).await.map_err(|e| {
            FacelightError::collaborator(
                "camera",
                format!("cannot read {}: {}", self.path.display(), e),
            )
        })?;
        debug!("Captured {} bytes from {}", data.len(), self.path.display());
        Ok(Bytes::from(data))
    }

    async fn switch_camera(&self) -> Result<()> {
        let front = !self.front_facing.fetch_xor(true, Ordering::SeqCst);
        info!(
            "Switched to {} camera",
            if front { "front" } else { "back" }
        );
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();

        let source = StillImageFrameSource::new(&path);
        assert!(source.request_permission().await);
        assert_eq!(source.capture_still().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_file_denies_permission() {
        let dir = tempfile::tempdir().unwrap();
        let source = StillImageFrameSource::new(dir.path().join("missing.jpg"));

        assert!(!source.request_permission().await);
        assert!(matches!(
            source.capture_still().await,
            Err(FacelightError::Collaborator { .. })
        ));
    }

    #[tokio::test]
    async fn test_switch_camera_toggles() {
        let source = StillImageFrameSource::new("still.jpg");
        assert!(source.is_front_facing());

        source.switch_camera().await.unwrap();
        assert!(!source.is_front_facing());
        source.switch_camera().await.unwrap();
        assert!(source.is_front_facing());
    }
}

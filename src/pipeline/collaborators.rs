use super::analysis::{AnalysisResult, Emotion};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Camera producing still frames
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn request_permission(&self) -> bool;

    /// Freeze and return the current frame as JPEG bytes
    async fn capture_still(&self) -> Result<Bytes>;

    async fn switch_camera(&self) -> Result<()>;

    /// Get ready for the next shot after a capture
    async fn resume(&self) -> Result<()>;
}

/// Destination namespace of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadNamespace {
    Analysis,
    Share,
}

/// Remote object storage
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload `image` as `name` and return the URL it is reachable under
    async fn upload(&self, image: Bytes, name: &str, namespace: UploadNamespace) -> Result<String>;
}

/// Remote face analysis
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Analyse the image at `url`; `Ok(None)` means no face was found
    async fn analyze(&self, url: &str) -> Result<Option<AnalysisResult>>;
}

/// Whatever turns analysis results into light changes
pub trait LightReactor {
    fn apply_emotion_reaction(&mut self, emotion: Emotion);

    fn apply_default_pattern(&mut self);
}

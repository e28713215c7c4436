use crate::error::{FacelightError, Result};
use crate::pipeline::{ObjectStorage, UploadNamespace};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Object storage backed by a local directory that some web server exposes
/// under `public_base_url`
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new<P: AsRef<Path>>(root: P, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn prefix(namespace: UploadNamespace) -> &'static str {
        match namespace {
            UploadNamespace::Analysis => "uploads",
            UploadNamespace::Share => "uploads/share",
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, image: Bytes, name: &str, namespace: UploadNamespace) -> Result<String> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(FacelightError::UploadFailed {
                reason: format!("invalid object name '{}'", name),
            });
        }

        let prefix = Self::prefix(namespace);
        let dir = self.root.join(prefix);
        let target = dir.join(name);
        let tmp = dir.join(format!(".{}.tmp", name));

        let write = async {
            fs::create_dir_all(&dir).await?;
            fs::write(&tmp, &image).await?;
            fs::rename(&tmp, &target).await
        };
        write.await.map_err(|e| FacelightError::UploadFailed {
            reason: format!("{}: {}", target.display(), e),
        })?;

        debug!("Stored {} ({} bytes)", target.display(), image.len());
        Ok(format!("{}/{}/{}", self.public_base_url, prefix, name))
    }
}

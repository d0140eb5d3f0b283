use async_trait::async_trait;
use log::{error, info};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Photo bytes addressed by their SHA-256 hex digest.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError>;
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError>;
    async fn delete(&self, hash: &str) -> Result<(), ImageStoreError>;
}

/// Public URI under which a stored photo is served; this is what posts keep
/// in `imageUri`.
pub fn image_uri(hash: &str) -> String {
    format!("/images/{hash}")
}

fn valid_hash(hash: &str) -> bool {
    hash.len() >= 2 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------- File-system implementation ----------------
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    /// Images live under `<data_dir>/images/<first two hex chars>/<hash>`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let root = data_dir.as_ref().join("images");
        info!("image store at '{}'", root.display());
        Self { root }
    }

    fn path_for(&self, hash: &str) -> Result<PathBuf, ImageStoreError> {
        if !valid_hash(hash) {
            return Err(ImageStoreError::NotFound);
        }
        Ok(self.root.join(&hash[0..2]).join(hash))
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, hash: &str, _mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        let path = self.path_for(hash).map_err(|_| ImageStoreError::Other(format!("bad hash '{hash}'")))?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ImageStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ImageStoreError::Other(e.to_string()))?;
        }
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            error!("image write failed hash={hash} path={} err={e}", path.display());
            return Err(ImageStoreError::Other(e.to_string()));
        }
        Ok(())
    }
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        let path = self.path_for(hash)?;
        let bytes = tokio::fs::read(&path).await.map_err(|_| ImageStoreError::NotFound)?;
        // mime is not stored; sniff it again
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }
    async fn delete(&self, hash: &str) -> Result<(), ImageStoreError> {
        // Best-effort delete: treat not found as success
        if let Ok(path) = self.path_for(hash) {
            let _ = tokio::fs::remove_file(&path).await;
        }
        Ok(())
    }
}

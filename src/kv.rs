use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

#[derive(thiserror::Error, Debug)]
pub enum KvError {
    #[error("io: {0}")] Io(#[from] std::io::Error),
    #[error("{0}")] Other(String),
}

pub type KvResult<T> = Result<T, KvError>;

/// String-keyed blob storage. No transactions, no schema.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> KvResult<()>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> KvResult<()>;
}

/// Process-local adapter. Nothing survives the process; used by tests.
#[derive(Clone, Default)]
pub struct InMemKv {
    entries: Arc<DashMap<String, String>>,
}

impl InMemKv {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn contains_key(&self, key: &str) -> bool { self.entries.contains_key(key) }
}

#[async_trait]
impl KvStore for InMemKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }
    async fn set(&self, key: &str, value: &str) -> KvResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
    async fn remove(&self, key: &str) -> KvResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a data directory.
#[derive(Clone)]
pub struct FileKv {
    dir: Arc<PathBuf>,
}

impl FileKv {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Arc::new(dir.into()) }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn path_for(&self, key: &str) -> KvResult<PathBuf> {
        // keys become file names; refuse anything that could escape the dir
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(KvError::Other(format!("invalid key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KvStore for FileKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
    async fn set(&self, key: &str, value: &str) -> KvResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&*self.dir).await?;
        // write-then-rename so a reader never sees half a snapshot;
        // overlapping writes to one key each get their own temp file
        let tmp = self.dir.join(format!("{key}.{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, value).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
    async fn remove(&self, key: &str) -> KvResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

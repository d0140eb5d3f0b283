use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::kv::{KvError, KvStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistMode {
    /// Spawn the write and return immediately; failures are logged only.
    #[default]
    FireAndForget,
    /// Await the write and hand failures back to the caller.
    Awaited,
}

impl std::str::FromStr for PersistMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fire-and-forget" | "async" => Ok(PersistMode::FireAndForget),
            "awaited" | "sync" => Ok(PersistMode::Awaited),
            other => Err(format!("unknown persist mode '{other}'")),
        }
    }
}

/// Writes full snapshots to a [`KvStore`].
///
/// In fire-and-forget mode every write runs as its own task. Tasks are not
/// ordered: a snapshot queued earlier may land after one queued later.
#[derive(Clone)]
pub struct Persister {
    kv: Arc<dyn KvStore>,
    mode: PersistMode,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl Persister {
    pub fn new(kv: Arc<dyn KvStore>, mode: PersistMode) -> Self {
        Self { kv, mode, pending: Arc::new(Mutex::new(JoinSet::new())) }
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> { &self.kv }

    pub fn mode(&self) -> PersistMode { self.mode }

    pub async fn write(&self, key: String, value: String) -> Result<(), KvError> {
        match self.mode {
            PersistMode::Awaited => self.kv.set(&key, &value).await,
            PersistMode::FireAndForget => {
                let kv = self.kv.clone();
                self.spawn(async move {
                    if let Err(e) = kv.set(&key, &value).await {
                        tracing::warn!(%key, error = %e, "snapshot write failed; change not saved");
                    } else {
                        tracing::trace!(%key, bytes = value.len(), "snapshot written");
                    }
                })
                .await;
                Ok(())
            }
        }
    }

    pub async fn remove(&self, key: String) -> Result<(), KvError> {
        match self.mode {
            PersistMode::Awaited => self.kv.remove(&key).await,
            PersistMode::FireAndForget => {
                let kv = self.kv.clone();
                self.spawn(async move {
                    if let Err(e) = kv.remove(&key).await {
                        tracing::warn!(%key, error = %e, "key removal failed");
                    }
                })
                .await;
                Ok(())
            }
        }
    }

    async fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut set = self.pending.lock().await;
        // reap finished writes so the set does not grow for the whole session
        while set.try_join_next().is_some() {}
        set.spawn(fut);
    }

    /// Wait for every outstanding fire-and-forget write.
    pub async fn flush(&self) {
        let mut set = std::mem::take(&mut *self.pending.lock().await);
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                tracing::warn!(error = %e, "snapshot write task did not finish");
            }
        }
    }

    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }
}

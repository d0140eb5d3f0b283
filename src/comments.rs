use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{Comment, Id};
use crate::persist::Persister;
use crate::store::{StoreError, StoreResult};

/// Storage key holding one post's comments.
pub fn comment_key(post_id: Id) -> String {
    format!("comments_{post_id}")
}

/// Owns every post's comment sequence. Each sequence is persisted in full
/// under [`comment_key`] whenever it changes.
#[derive(Clone)]
pub struct CommentStore {
    by_post: Arc<RwLock<HashMap<Id, Vec<Comment>>>>,
    persister: Persister,
}

impl CommentStore {
    pub fn new(persister: Persister) -> Self {
        Self { by_post: Arc::new(RwLock::new(HashMap::new())), persister }
    }

    /// Hydrate one post's comments from storage, replacing the cached copy.
    ///
    /// Malformed data leaves the post without comments and returns
    /// `StoreError::Deserialization`.
    pub async fn load(&self, post_id: Id) -> StoreResult<Vec<Comment>> {
        let key = comment_key(post_id);
        let raw = self.persister.kv().get(&key).await?;
        let comments = match raw {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<Comment>>(&raw) {
                Ok(c) => c,
                Err(source) => {
                    self.by_post.write().await.remove(&post_id);
                    return Err(StoreError::Deserialization { key, source });
                }
            },
        };
        self.by_post.write().await.insert(post_id, comments.clone());
        Ok(comments)
    }

    /// Overwrite the post's sequence and its derived key.
    pub async fn save(&self, post_id: Id, comments: Vec<Comment>) -> StoreResult<()> {
        let snapshot = serde_json::to_string(&comments)?;
        self.by_post.write().await.insert(post_id, comments);
        self.persister.write(comment_key(post_id), snapshot).await?;
        Ok(())
    }

    pub async fn append(&self, post_id: Id, comment: Comment) -> StoreResult<()> {
        let snapshot = {
            let mut by_post = self.by_post.write().await;
            let seq = by_post.entry(post_id).or_default();
            seq.push(comment);
            serde_json::to_string(seq)?
        };
        self.persister.write(comment_key(post_id), snapshot).await?;
        Ok(())
    }

    pub async fn list(&self, post_id: Id) -> Vec<Comment> {
        self.by_post.read().await.get(&post_id).cloned().unwrap_or_default()
    }

    pub async fn count(&self, post_id: Id) -> usize {
        self.by_post.read().await.get(&post_id).map_or(0, Vec::len)
    }

    /// Drop the post's comments from memory and storage.
    pub async fn remove(&self, post_id: Id) -> StoreResult<()> {
        self.by_post.write().await.remove(&post_id);
        self.persister.remove(comment_key(post_id)).await?;
        Ok(())
    }

    pub(crate) async fn clear(&self) {
        self.by_post.write().await.clear();
    }

    pub async fn flush(&self) {
        self.persister.flush().await;
    }
}

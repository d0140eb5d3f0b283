use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::comments::CommentStore;
use crate::ids::{IdGenerator, IdStrategy, IdsExhausted};
use crate::kv::{KvError, KvStore};
use crate::models::*;
use crate::persist::{PersistMode, Persister};
use crate::validation::{validate_comment, ValidationError};

/// Storage key of the post collection snapshot.
pub const POSTS_KEY: &str = "posts";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)] Validation(#[from] ValidationError),
    #[error("malformed data under '{key}': {source}")]
    Deserialization { key: String, source: serde_json::Error },
    #[error("encode: {0}")] Encode(#[from] serde_json::Error),
    #[error("persistence: {0}")] Persistence(#[from] KvError),
    #[error(transparent)] Ids(#[from] IdsExhausted),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreConfig {
    pub persist: PersistMode,
    pub ids: IdStrategy,
}

// Older snapshots embedded comments inside each post, sometimes as bare strings.
#[derive(Deserialize)]
struct StoredPost {
    #[serde(flatten)]
    post: Post,
    #[serde(default)]
    comments: Vec<LegacyComment>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyComment {
    Full(Comment),
    Text(String),
}

/// The post collection of one session, mirrored to a [`KvStore`].
///
/// Mutations update memory first and then write the full collection. Comments
/// are owned by the embedded [`CommentStore`]; the `posts` snapshot carries
/// none.
#[derive(Clone)]
pub struct PostStore {
    posts: Arc<RwLock<Vec<Post>>>,
    comments: CommentStore,
    persister: Persister,
    ids: IdGenerator,
}

impl PostStore {
    pub fn new(kv: Arc<dyn KvStore>, config: StoreConfig) -> Self {
        Self::with_ids(kv, config.persist, IdGenerator::system(config.ids))
    }

    pub fn with_ids(kv: Arc<dyn KvStore>, mode: PersistMode, ids: IdGenerator) -> Self {
        let persister = Persister::new(kv, mode);
        Self {
            posts: Arc::new(RwLock::new(Vec::new())),
            comments: CommentStore::new(persister.clone()),
            persister,
            ids,
        }
    }

    /// Construct and load. A failed load leaves the store empty.
    pub async fn init(kv: Arc<dyn KvStore>, config: StoreConfig) -> Self {
        let store = Self::new(kv, config);
        match store.load().await {
            Ok(n) => tracing::info!(posts = n, "post store loaded"),
            Err(e) => tracing::warn!(error = %e, "post store load failed; starting empty"),
        }
        store
    }

    /// Wait for outstanding writes and release the store.
    pub async fn dispose(self) {
        self.persister.flush().await;
    }

    pub async fn flush(&self) {
        self.persister.flush().await;
    }

    pub fn comment_store(&self) -> &CommentStore { &self.comments }

    pub fn id_generator(&self) -> &IdGenerator { &self.ids }

    /// Replace memory with the durable state and return the number of posts.
    ///
    /// Malformed `posts` data empties the store and returns
    /// `StoreError::Deserialization`; callers treat that as "start empty".
    pub async fn load(&self) -> StoreResult<usize> {
        let stored: Vec<StoredPost> = match self.persister.kv().get(POSTS_KEY).await? {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(source) => {
                    self.posts.write().await.clear();
                    self.comments.clear().await;
                    return Err(StoreError::Deserialization { key: POSTS_KEY.to_string(), source });
                }
            },
        };

        let mut posts: Vec<Post> = Vec::with_capacity(stored.len());
        let mut embedded = Vec::new();
        for s in stored {
            if posts.iter().any(|p| p.id == s.post.id) {
                tracing::warn!(id = s.post.id, "duplicate post id in snapshot; keeping first");
                continue;
            }
            self.ids.observe(s.post.id);
            if !s.comments.is_empty() {
                embedded.push((s.post.id, s.comments));
            }
            posts.push(s.post);
        }

        self.comments.clear().await;
        for post in &posts {
            if let Err(e) = self.comments.load(post.id).await {
                tracing::warn!(post_id = post.id, error = %e, "comments unavailable for post");
            }
        }

        let mut migrate = !embedded.is_empty();
        for (post_id, legacy) in embedded {
            if self.comments.count(post_id).await > 0 {
                continue;
            }
            let migrated = match self.upgrade(legacy) {
                Ok(m) => m,
                Err(e) => {
                    // keep the embedded copies on disk for the next load
                    tracing::warn!(post_id, error = %e, "embedded comments not migrated");
                    migrate = false;
                    continue;
                }
            };
            tracing::info!(post_id, count = migrated.len(), "migrating embedded comments");
            if let Err(e) = self.comments.save(post_id, migrated).await {
                tracing::warn!(post_id, error = %e, "comment migration not saved");
            }
        }

        let n = posts.len();
        let snapshot = serde_json::to_string(&posts)?;
        *self.posts.write().await = posts;
        if migrate {
            // rewrite without the embedded copies
            self.persist(snapshot).await?;
        }
        Ok(n)
    }

    /// Bare-text comments of one post get consecutive ids from a single mint.
    fn upgrade(&self, legacy: Vec<LegacyComment>) -> StoreResult<Vec<Comment>> {
        let base = self.ids.next_id()?;
        let timestamp = self.ids.timestamp();
        let mut offset: Id = 0;
        let mut out = Vec::with_capacity(legacy.len());
        for c in legacy {
            match c {
                LegacyComment::Full(c) => out.push(c),
                LegacyComment::Text(text) => {
                    let id = base.checked_add(offset).ok_or(IdsExhausted(base))?;
                    offset += 1;
                    self.ids.observe(id);
                    out.push(Comment {
                        id,
                        text,
                        author: ANONYMOUS_AUTHOR.to_string(),
                        timestamp: timestamp.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    async fn persist(&self, snapshot: String) -> StoreResult<()> {
        self.persister.write(POSTS_KEY.to_string(), snapshot).await?;
        Ok(())
    }

    /// Append unless a post with the same id exists (first writer wins).
    /// Returns whether the post was inserted.
    pub async fn add_post(&self, post: Post) -> StoreResult<bool> {
        let snapshot = {
            let mut posts = self.posts.write().await;
            if posts.iter().any(|p| p.id == post.id) {
                tracing::debug!(id = post.id, "duplicate post ignored");
                return Ok(false);
            }
            self.ids.observe(post.id);
            posts.push(post);
            serde_json::to_string(&*posts)?
        };
        self.persist(snapshot).await?;
        Ok(true)
    }

    /// Mint an id for `new` and add it.
    pub async fn create_post(&self, new: NewPost) -> StoreResult<Post> {
        let post = Post {
            id: self.ids.next_id()?,
            title: new.title,
            location: new.location,
            image_uri: new.image_uri,
            latitude: new.latitude,
            longitude: new.longitude,
        };
        if !self.add_post(post.clone()).await? {
            // only reachable with timestamp ids minted in the same millisecond
            tracing::warn!(id = post.id, "minted id already taken; post dropped");
        }
        Ok(post)
    }

    /// Remove the post and its comments. Absent ids are not an error.
    pub async fn delete_post(&self, id: Id) -> StoreResult<()> {
        let (removed, snapshot) = {
            let mut posts = self.posts.write().await;
            let before = posts.len();
            posts.retain(|p| p.id != id);
            (posts.len() != before, serde_json::to_string(&*posts)?)
        };
        let written = self.persist(snapshot).await;
        if removed {
            // drop the comments even when the snapshot write failed
            let dropped = self.comments.remove(id).await;
            written?;
            return dropped;
        }
        written
    }

    /// Append a comment to `post_id`. `Ok(None)` when the post is unknown.
    pub async fn append_comment(&self, post_id: Id, text: &str) -> StoreResult<Option<Comment>> {
        let text = validate_comment(text)?;
        // hold the read side so a concurrent delete cannot orphan the comment
        let posts = self.posts.read().await;
        if !posts.iter().any(|p| p.id == post_id) {
            return Ok(None);
        }
        let comment = Comment {
            id: self.ids.next_id()?,
            text: text.to_string(),
            author: ANONYMOUS_AUTHOR.to_string(),
            timestamp: self.ids.timestamp(),
        };
        self.comments.append(post_id, comment.clone()).await?;
        drop(posts);
        Ok(Some(comment))
    }

    pub async fn comment_count(&self, post_id: Id) -> usize {
        let posts = self.posts.read().await;
        if !posts.iter().any(|p| p.id == post_id) {
            return 0;
        }
        self.comments.count(post_id).await
    }

    pub async fn comments(&self, post_id: Id) -> Vec<Comment> {
        let posts = self.posts.read().await;
        if !posts.iter().any(|p| p.id == post_id) {
            return Vec::new();
        }
        self.comments.list(post_id).await
    }

    pub async fn posts(&self) -> Vec<Post> {
        self.posts.read().await.clone()
    }

    pub async fn get_post(&self, id: Id) -> Option<Post> {
        self.posts.read().await.iter().find(|p| p.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.posts.read().await.is_empty()
    }

    pub async fn get_view(&self, id: Id) -> Option<PostView> {
        let post = self.get_post(id).await?;
        let comments = self.comments.list(id).await;
        Some(PostView { post, comments })
    }

    /// Every post with its comments, in insertion order.
    pub async fn views(&self) -> Vec<PostView> {
        let posts = self.posts().await;
        let mut out = Vec::with_capacity(posts.len());
        for post in posts {
            let comments = self.comments.list(post.id).await;
            out.push(PostView { post, comments });
        }
        out
    }

    pub async fn summaries(&self) -> Vec<PostSummary> {
        let posts = self.posts().await;
        let mut out = Vec::with_capacity(posts.len());
        for post in posts {
            let comment_count = self.comments.count(post.id).await;
            out.push(PostSummary { post, comment_count });
        }
        out
    }

    /// Marker data for the map screen; `None` without coordinates.
    pub async fn map_pin(&self, id: Id) -> Option<MapPin> {
        let post = self.get_post(id).await?;
        let coordinates = post.coordinates()?;
        Some(MapPin { post_id: post.id, title: post.title, photo: post.image_uri, coordinates })
    }
}

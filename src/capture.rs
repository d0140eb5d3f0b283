//! Permission-gated capture and the post creation flow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Coordinates, NewPost, Post};
use crate::store::{PostStore, StoreResult};

/// Outcome of a capability that needs user consent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum Permission<T> {
    Granted(T),
    Denied,
}

impl<T> Permission<T> {
    pub fn granted(self) -> Option<T> {
        match self {
            Permission::Granted(v) => Some(v),
            Permission::Denied => None,
        }
    }

    pub fn is_denied(&self) -> bool { matches!(self, Permission::Denied) }
}

impl<T> From<Option<T>> for Permission<T> {
    fn from(v: Option<T>) -> Self {
        v.map_or(Permission::Denied, Permission::Granted)
    }
}

/// Camera and gallery. A granted `None` means the user cancelled.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn take_photo(&self) -> Permission<Option<String>>;
    async fn pick_from_gallery(&self) -> Permission<Option<String>>;
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Permission<Coordinates>;
}

/// Always answers with the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinates);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Permission<Coordinates> {
        Permission::Granted(self.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeniedLocation;

#[async_trait]
impl LocationProvider for DeniedLocation {
    async fn current_position(&self) -> Permission<Coordinates> {
        Permission::Denied
    }
}

/// Form state of the create screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostDraft {
    pub title: String,
    pub location: String,
    pub photo: Option<String>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, location: impl Into<String>) -> Self {
        Self { title: title.into(), location: location.into(), photo: None }
    }

    /// Keep the previous photo when the source was denied or cancelled.
    pub async fn capture_photo(&mut self, source: &dyn ImageSource) -> Permission<()> {
        self.apply(source.take_photo().await)
    }

    pub async fn pick_photo(&mut self, source: &dyn ImageSource) -> Permission<()> {
        self.apply(source.pick_from_gallery().await)
    }

    fn apply(&mut self, outcome: Permission<Option<String>>) -> Permission<()> {
        match outcome {
            Permission::Granted(Some(uri)) => {
                self.photo = Some(uri);
                Permission::Granted(())
            }
            Permission::Granted(None) => Permission::Granted(()),
            Permission::Denied => Permission::Denied,
        }
    }

    pub fn remove_photo(&mut self) {
        self.photo = None;
    }

    /// Publishing needs the current position; without it nothing is stored.
    pub async fn publish(
        &self,
        store: &PostStore,
        locator: &dyn LocationProvider,
    ) -> StoreResult<Permission<Post>> {
        let coords = match locator.current_position().await {
            Permission::Granted(c) => c,
            Permission::Denied => {
                tracing::info!("location permission denied; post not published");
                return Ok(Permission::Denied);
            }
        };
        let post = store
            .create_post(NewPost {
                title: self.title.clone(),
                location: self.location.clone(),
                image_uri: self.photo.clone(),
                latitude: Some(coords.latitude),
                longitude: Some(coords.longitude),
            })
            .await?;
        Ok(Permission::Granted(post))
    }
}

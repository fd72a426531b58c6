//! # kinfolk-backend
//!
//! The request/response contract the application needs from the hosted
//! backend (auth, message table, object storage, realtime change feed),
//! expressed as object-safe traits so every controller receives an injected
//! `Arc<dyn Backend>` instead of reaching for a global client.
//!
//! Two implementations ship with the crate:
//! - [`RestBackend`] talks to the hosted service over HTTP and a realtime
//!   WebSocket, persisting the session token pair in the data directory.
//! - [`MemoryBackend`] keeps everything in memory and enforces the same
//!   row-level rules; tests and offline demos use it.

pub mod error;
pub mod memory;
pub mod realtime;
pub mod rest;
pub mod session_file;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use kinfolk_shared::{
    AuthEvent, ChangeEvent, GroupSettings, Identity, Message, MessageId, NewMessage, Participant,
    ProfileMetadata, ProfileRow, UserId,
};

pub use error::{BackendError, Result};
pub use memory::MemoryBackend;
pub use rest::{BackendConfig, RestBackend};
pub use session_file::{SessionFile, StoredSession};

/// Authentication service.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    /// Create an account. `metadata` becomes the identity's display name and
    /// photo. The returned identity may have no live session when the
    /// service requires email confirmation.
    async fn sign_up(&self, email: &str, password: &str, metadata: &ProfileMetadata)
        -> Result<Identity>;

    async fn sign_out(&self) -> Result<()>;

    /// Load a persisted session (refreshing it if close to expiry).
    async fn restore_session(&self) -> Result<Option<Identity>>;

    fn current_identity(&self) -> Option<Identity>;

    /// Push channel of session transitions. Every call returns an
    /// independent receiver.
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;

    async fn request_password_reset(&self, email: &str) -> Result<()>;

    async fn resend_confirmation(&self, email: &str) -> Result<()>;

    async fn update_profile_metadata(&self, metadata: &ProfileMetadata) -> Result<Identity>;

    /// Forget every piece of locally persisted state (session tokens).
    async fn clear_local_state(&self) -> Result<()>;
}

/// Message table plus the two auxiliary tables the app touches.
#[async_trait]
pub trait MessageTable: Send + Sync {
    /// All messages ordered by `created_at` ascending.
    async fn select_messages(&self) -> Result<Vec<Message>>;

    /// Author snapshots of every message, newest first. May repeat authors.
    async fn select_authors(&self) -> Result<Vec<Participant>>;

    /// Insert one row and return it as stored.
    async fn insert_message(&self, message: &NewMessage) -> Result<Message>;

    /// Delete the given rows restricted to those owned by `owner`.
    /// Returns the ids actually deleted; rows rejected by the row-level
    /// policy are silently absent from the result.
    async fn delete_messages(&self, ids: &[MessageId], owner: UserId) -> Result<Vec<MessageId>>;

    /// Reachability check: endpoint plus a one-row select on the message table.
    async fn probe(&self) -> Result<()>;

    async fn insert_profile(&self, profile: &ProfileRow) -> Result<()>;

    async fn fetch_group_settings(&self) -> Result<Option<GroupSettings>>;
}

/// Public object storage.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, path: &str, content_type: &str, bytes: Bytes) -> Result<()>;

    fn public_url(&self, path: &str) -> String;
}

/// Push-based insert/delete feed scoped to the message table.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self) -> Result<Subscription>;
}

/// Everything the application needs from the hosted service.
pub trait Backend: AuthApi + MessageTable + ObjectStorage + ChangeFeed {}

impl<T: AuthApi + MessageTable + ObjectStorage + ChangeFeed> Backend for T {}

/// A live change-feed subscription.
///
/// Events are produced by a background task; dropping the subscription (or
/// calling [`Subscription::unsubscribe`]) aborts that task so no handler
/// outlives its owner.
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<ChangeEvent>, task: JoinHandle<()>) -> Self {
        Self {
            events,
            task: Some(task),
        }
    }

    /// Next change, or `None` once the feed has shut down.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("change feed subscription released");
        }
        self.events.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

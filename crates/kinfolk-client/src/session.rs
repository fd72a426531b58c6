//! Session store: the current identity plus push notification of session
//! transitions coming from the auth service.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use kinfolk_backend::Backend;
use kinfolk_shared::error::Result;
use kinfolk_shared::Identity;

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn Backend>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Current identity, if signed in.
    pub fn get_session(&self) -> Option<Identity> {
        self.backend.current_identity()
    }

    /// Initial session lookup (persisted session, refreshed if needed).
    pub async fn restore(&self) -> Result<Option<Identity>> {
        let identity = self.backend.restore_session().await?;
        match &identity {
            Some(id) => tracing::info!(user = %id.id, "session restored"),
            None => tracing::debug!("no stored session"),
        }
        Ok(identity)
    }

    /// Invoke `handler` with the new identity on every session transition
    /// (sign in, sign out, token refresh, profile update).
    ///
    /// Delivery stops when the returned [`Listener`] is dropped.
    pub fn on_change<F>(&self, handler: F) -> Listener
    where
        F: Fn(Option<Identity>) + Send + 'static,
    {
        let mut events = self.backend.auth_events();
        let backend = Arc::clone(&self.backend);
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        tracing::debug!(kind = ?event.kind, "session transition");
                        handler(event.identity);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "session listener lagged, resyncing");
                        handler(backend.current_identity());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Listener { task: Some(task) }
    }
}

/// Registration handle returned by [`SessionStore::on_change`].
pub struct Listener {
    task: Option<JoinHandle<()>>,
}

impl Listener {
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

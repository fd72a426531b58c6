//! HTTP implementation of the backend contract.
//!
//! Auth, table and storage requests all go through one [`reqwest::Client`].
//! Every request carries the project's public key as `apikey`; the bearer
//! token is the signed-in user's access token when there is one, the public
//! key otherwise.

mod auth;
mod data;
mod storage;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use tokio::sync::{broadcast, Mutex};

use kinfolk_shared::{AuthEvent, AuthEventKind, Identity, ProfileMetadata, UserId};

use crate::error::{BackendError, Result};
use crate::realtime::RealtimeFeed;
use crate::session_file::{SessionFile, StoredSession};
use crate::{ChangeFeed, Subscription};

const AUTH_EVENT_CAPACITY: usize = 16;

/// Which hosted project to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Service endpoint, e.g. `https://<ref>.supabase.co`.
    pub url: String,
    /// Public (anon) API key.
    pub public_key: String,
    pub media_bucket: String,
}

impl BackendConfig {
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

pub struct RestBackend {
    config: Arc<BackendConfig>,
    http: reqwest::Client,
    session: RwLock<Option<StoredSession>>,
    /// Serializes token refreshes so concurrent calls don't race the
    /// single-use refresh token.
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
    store: Option<SessionFile>,
}

impl RestBackend {
    /// Build a backend. `store` is where the session is persisted; `None`
    /// keeps the session in memory only.
    pub fn new(config: BackendConfig, store: Option<SessionFile>) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        tracing::info!(url = %config.url, bucket = %config.media_bucket, "backend configured");
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            events,
            store,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Request with the `apikey` header and an explicit bearer.
    fn request_with(&self, method: Method, path: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, self.config.endpoint(path))
            .header("apikey", &self.config.public_key)
            .bearer_auth(bearer)
    }

    /// Request authorized as the public (anonymous) role.
    fn anon(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_with(method, path, &self.config.public_key)
    }

    /// Request authorized as the current user when signed in.
    async fn authed(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = match self.access_token().await {
            Ok(token) => token,
            Err(BackendError::NotSignedIn) => self.config.public_key.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed, falling back to public key");
                self.config.public_key.clone()
            }
        };
        self.request_with(method, path, &bearer)
    }

    /// Access token of the live session, refreshed first when it is about
    /// to expire.
    async fn access_token(&self) -> Result<String> {
        let current = self.stored_session().ok_or(BackendError::NotSignedIn)?;
        if !current.needs_refresh() {
            return Ok(current.access_token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        let current = self.stored_session().ok_or(BackendError::NotSignedIn)?;
        if !current.needs_refresh() {
            return Ok(current.access_token);
        }

        let refreshed = self.refresh(&current.refresh_token).await?;
        let token = refreshed.access_token.clone();
        self.install_session(refreshed, AuthEventKind::TokenRefreshed)
            .await;
        Ok(token)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredSession> {
        tracing::debug!("refreshing access token");
        let resp = self
            .anon(Method::POST, "auth/v1/token?grant_type=refresh_token")
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let tokens: TokenResponse = check(resp).await?.json().await?;
        Ok(tokens.into_session())
    }

    fn stored_session(&self) -> Option<StoredSession> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace_session(&self, session: Option<StoredSession>) {
        match self.session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    /// Make `session` the live one, persist it and notify listeners.
    async fn install_session(&self, session: StoredSession, kind: AuthEventKind) {
        let identity = session.user.clone();
        self.replace_session(Some(session.clone()));

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&session).await {
                tracing::warn!(error = %e, "failed to persist session");
            }
        }

        tracing::info!(user = %identity.id, ?kind, "session updated");
        self.emit(kind, Some(identity));
    }

    /// Forget the live session locally and notify listeners.
    async fn drop_session(&self) -> Result<()> {
        let had_session = self.stored_session().is_some();
        self.replace_session(None);
        if let Some(store) = &self.store {
            store.clear().await?;
        }
        if had_session {
            self.emit(AuthEventKind::SignedOut, None);
        }
        Ok(())
    }

    fn emit(&self, kind: AuthEventKind, identity: Option<Identity>) {
        // No receivers is fine: nobody is listening yet.
        if self.events.send(AuthEvent { kind, identity }).is_err() {
            tracing::trace!(?kind, "auth event dropped, no listeners");
        }
    }
}

#[async_trait]
impl ChangeFeed for RestBackend {
    async fn subscribe(&self) -> Result<Subscription> {
        let token = self.access_token().await.ok();
        RealtimeFeed::new(&self.config, token).spawn()
    }
}

/// Turn a non-success response into a [`BackendError::Api`].
pub(crate) async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let err = BackendError::from_body(status.as_u16(), &body);
    tracing::debug!(status = status.as_u16(), error = %err, "request rejected");
    Err(err)
}

/// Auth service user object.
#[derive(Debug, Deserialize)]
pub(crate) struct AuthUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: ProfileMetadata,
}

impl From<AuthUser> for Identity {
    fn from(user: AuthUser) -> Self {
        Identity {
            id: user.id,
            email: user.email,
            display_name: user.user_metadata.display_name,
            photo_url: user.user_metadata.photo_url,
        }
    }
}

/// Response of the token and (confirmation-less) signup endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    pub(crate) fn into_session(self) -> StoredSession {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + self.expires_in.unwrap_or(3600));
        StoredSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

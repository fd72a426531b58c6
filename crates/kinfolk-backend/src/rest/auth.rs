use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

use kinfolk_shared::{AuthEvent, AuthEventKind, Identity, ProfileMetadata};

use super::{check, AuthUser, RestBackend, TokenResponse};
use crate::error::{BackendError, Result};
use crate::AuthApi;

/// Signup answers with a full session when email confirmation is off and
/// with the bare user object when it is on.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

#[async_trait]
impl AuthApi for RestBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        tracing::debug!(email, "signing in");
        let resp = self
            .anon(Method::POST, "auth/v1/token?grant_type=password")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let tokens: TokenResponse = check(resp).await?.json().await?;

        let session = tokens.into_session();
        let identity = session.user.clone();
        self.install_session(session, AuthEventKind::SignedIn).await;
        Ok(identity)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &ProfileMetadata,
    ) -> Result<Identity> {
        tracing::debug!(email, "signing up");
        let resp = self
            .anon(Method::POST, "auth/v1/signup")
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;

        match check(resp).await?.json::<SignUpResponse>().await? {
            SignUpResponse::Session(tokens) => {
                let session = tokens.into_session();
                let identity = session.user.clone();
                self.install_session(session, AuthEventKind::SignedIn).await;
                Ok(identity)
            }
            SignUpResponse::User(user) => {
                let identity = Identity::from(user);
                tracing::info!(user = %identity.id, "account created, awaiting email confirmation");
                Ok(identity)
            }
        }
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.stored_session() {
            let revoked = self
                .request_with(Method::POST, "auth/v1/logout", &session.access_token)
                .send()
                .await;
            match revoked {
                Ok(resp) => {
                    if let Err(e) = check(resp).await {
                        tracing::warn!(error = %e, "server-side logout rejected");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "server-side logout failed"),
            }
        }
        // The local session goes away regardless of the server's answer.
        self.drop_session().await
    }

    async fn restore_session(&self) -> Result<Option<Identity>> {
        let Some(store) = &self.store else {
            return Ok(self.current_identity());
        };
        let Some(stored) = store.load().await? else {
            return Ok(None);
        };

        if !stored.needs_refresh() {
            let identity = stored.user.clone();
            self.install_session(stored, AuthEventKind::SignedIn).await;
            return Ok(Some(identity));
        }

        match self.refresh(&stored.refresh_token).await {
            Ok(fresh) => {
                let identity = fresh.user.clone();
                self.install_session(fresh, AuthEventKind::TokenRefreshed)
                    .await;
                Ok(Some(identity))
            }
            Err(BackendError::Api { status, message, .. }) => {
                tracing::info!(status, %message, "stored session rejected, signing out");
                store.clear().await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn current_identity(&self) -> Option<Identity> {
        self.stored_session().map(|s| s.user)
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn request_password_reset(&self, email: &str) -> Result<()> {
        let resp = self
            .anon(Method::POST, "auth/v1/recover")
            .json(&json!({ "email": email }))
            .send()
            .await?;
        check(resp).await?;
        tracing::info!(email, "password reset requested");
        Ok(())
    }

    async fn resend_confirmation(&self, email: &str) -> Result<()> {
        let resp = self
            .anon(Method::POST, "auth/v1/resend")
            .json(&json!({ "type": "signup", "email": email }))
            .send()
            .await?;
        check(resp).await?;
        tracing::info!(email, "confirmation email re-sent");
        Ok(())
    }

    async fn update_profile_metadata(&self, metadata: &ProfileMetadata) -> Result<Identity> {
        let token = self.access_token().await?;
        let resp = self
            .request_with(Method::PUT, "auth/v1/user", &token)
            .json(&json!({ "data": metadata }))
            .send()
            .await?;
        let user: AuthUser = check(resp).await?.json().await?;
        let identity = Identity::from(user);

        let mut session = self.stored_session().ok_or(BackendError::NotSignedIn)?;
        session.user = identity.clone();
        self.install_session(session, AuthEventKind::UserUpdated)
            .await;
        Ok(identity)
    }

    async fn clear_local_state(&self) -> Result<()> {
        tracing::warn!("clearing local session state");
        self.drop_session().await
    }
}

//! Email/password authentication flow.
//!
//! Owns the login/signup mode toggle, the email-confirmation affordance and
//! the cooldown shared by every rate-limited auth action.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use kinfolk_backend::Backend;
use kinfolk_shared::constants::DEFAULT_COOLDOWN_SECS;
use kinfolk_shared::error::Result;
use kinfolk_shared::{generated_avatar_url, Attachment, ChatError, Identity, ProfileMetadata, ProfileRow};

use crate::cooldown::Cooldown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Login,
    Signup,
}

/// Outcome of [`AuthFlow::test_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionReport {
    Reachable { elapsed: Duration },
    /// The service answered but the message table does not exist yet.
    ReachableSchemaMissing { elapsed: Duration },
    Failed(ChatError),
}

pub struct AuthFlow {
    backend: Arc<dyn Backend>,
    mode: AuthMode,
    needs_confirmation: bool,
    cooldown: Cooldown,
    last_error: Option<ChatError>,
}

impl AuthFlow {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            mode: AuthMode::Login,
            needs_confirmation: false,
            cooldown: Cooldown::default(),
            last_error: None,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AuthMode::Login => AuthMode::Signup,
            AuthMode::Signup => AuthMode::Login,
        };
        self.last_error = None;
    }

    /// True after a login failed because the email is unconfirmed.
    pub fn needs_confirmation(&self) -> bool {
        self.needs_confirmation
    }

    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    pub fn last_error(&self) -> Option<&ChatError> {
        self.last_error.as_ref()
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<Identity> {
        let outcome = self.try_login(email, password).await;
        self.settle(outcome)
    }

    async fn try_login(&mut self, email: &str, password: &str) -> Result<Identity> {
        let (email, password) = required_credentials(email, password)?;
        let identity = self.backend.sign_in(email, password).await?;
        tracing::info!(user = %identity.id, "logged in");
        self.needs_confirmation = false;
        Ok(identity)
    }

    /// Create an account. The caller decides whether to unlock.
    pub async fn signup(
        &mut self,
        email: &str,
        password: &str,
        name: &str,
        photo: Option<&Attachment>,
    ) -> Result<Identity> {
        let outcome = self.try_signup(email, password, name, photo).await;
        self.settle(outcome)
    }

    async fn try_signup(
        &mut self,
        email: &str,
        password: &str,
        name: &str,
        photo: Option<&Attachment>,
    ) -> Result<Identity> {
        let (email, password) = required_credentials(email, password)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::InvalidInput("Name is required.".into()));
        }

        let photo_url = match photo {
            Some(photo) => self.upload_signup_photo(photo, name).await,
            None => generated_avatar_url(name),
        };

        let metadata = ProfileMetadata {
            display_name: Some(name.to_string()),
            photo_url: Some(photo_url.clone()),
        };
        let identity = self.backend.sign_up(email, password, &metadata).await?;
        tracing::info!(user = %identity.id, "account created");

        let profile = ProfileRow {
            id: identity.id,
            email: email.to_string(),
            display_name: name.to_string(),
            photo_url,
        };
        if let Err(e) = self.backend.insert_profile(&profile).await {
            tracing::error!(user = %identity.id, error = %e, "failed to create user profile row");
        }

        Ok(identity)
    }

    /// Upload the chosen profile photo, falling back to a generated avatar.
    async fn upload_signup_photo(&self, photo: &Attachment, name: &str) -> String {
        let path = format!("profile_{}.{}", Utc::now().timestamp_millis(), photo.extension());
        match self
            .backend
            .upload(&path, &photo.content_type, photo.bytes.clone())
            .await
        {
            Ok(()) => self.backend.public_url(&path),
            Err(e) => {
                tracing::warn!(path, error = %e, "profile photo upload failed, using generated avatar");
                generated_avatar_url(name)
            }
        }
    }

    pub async fn request_password_reset(&mut self, email: &str) -> Result<()> {
        let email = self.cooldown_gate(email)?;
        let outcome = self.backend.request_password_reset(&email).await;
        self.settle_cooldown(outcome.map_err(ChatError::from))
    }

    pub async fn resend_confirmation(&mut self, email: &str) -> Result<()> {
        let email = self.cooldown_gate(email)?;
        let outcome = self.backend.resend_confirmation(&email).await;
        let outcome = self.settle_cooldown(outcome.map_err(ChatError::from));
        if outcome.is_ok() {
            self.needs_confirmation = false;
        }
        outcome
    }

    /// Probe the backend endpoint and the message table.
    pub async fn test_connection(&self) -> ConnectionReport {
        let started = Instant::now();
        let outcome = self.backend.probe().await.map_err(ChatError::from);
        let elapsed = started.elapsed();
        match outcome {
            Ok(()) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "connection test passed");
                ConnectionReport::Reachable { elapsed }
            }
            Err(ChatError::SchemaMissing) => ConnectionReport::ReachableSchemaMissing { elapsed },
            Err(e) => {
                tracing::warn!(error = %e, "connection test failed");
                ConnectionReport::Failed(e)
            }
        }
    }

    /// Validate the email and refuse while a cooldown is running.
    fn cooldown_gate(&mut self, email: &str) -> Result<String> {
        let email = email.trim();
        if email.is_empty() {
            let err = ChatError::InvalidInput("Please enter your email address.".into());
            self.last_error = Some(err.clone());
            return Err(err);
        }
        if self.cooldown.is_active() {
            let err = ChatError::RateLimited {
                retry_after_secs: self.cooldown.remaining_secs(),
            };
            self.last_error = Some(err.clone());
            return Err(err);
        }
        Ok(email.to_string())
    }

    fn settle_cooldown(&mut self, outcome: Result<()>) -> Result<()> {
        if outcome.is_ok() {
            self.cooldown.start(DEFAULT_COOLDOWN_SECS);
        }
        self.settle(outcome)
    }

    /// Record the outcome of an auth action: remember the error, start the
    /// cooldown on rate limiting, flag unconfirmed emails.
    fn settle<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match &outcome {
            Ok(_) => self.last_error = None,
            Err(e) => {
                if let Some(seconds) = e.retry_after() {
                    self.cooldown.start(seconds);
                }
                if *e == ChatError::EmailUnconfirmed {
                    self.needs_confirmation = true;
                }
                tracing::debug!(error = %e, "auth action failed");
                self.last_error = Some(e.clone());
            }
        }
        outcome
    }
}

fn required_credentials<'a>(email: &'a str, password: &'a str) -> Result<(&'a str, &'a str)> {
    let (email, password) = (email.trim(), password.trim());
    if email.is_empty() || password.is_empty() {
        return Err(ChatError::InvalidInput("Please fill in all fields.".into()));
    }
    Ok((email, password))
}

//! Top-level shell: decides which view is showing and owns the per-view
//! controllers.
//!
//! The chat controllers only exist while an identity is signed in and the
//! lock gate is open. Locking or signing out drops them, which releases the
//! change-feed subscription.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use kinfolk_backend::Backend;
use kinfolk_shared::{Attachment, ChangeEvent, ChatError, Identity};

use crate::auth::AuthFlow;
use crate::commands::{self, Command, Flow};
use crate::config::AppConfig;
use crate::feed::FeedController;
use crate::group::GroupPanel;
use crate::lock::{LockGate, Visibility};
use crate::notify::Notifier;
use crate::prompt::Prompter;
use crate::session::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    ConfigurationMissing,
    Loading,
    Auth,
    Lock,
    Chat,
    Crashed { message: String },
}

pub struct Shell {
    config: AppConfig,
    backend: Option<Arc<dyn Backend>>,
    prompter: Arc<dyn Prompter>,
    notifier: Arc<dyn Notifier>,
    session: Option<SessionStore>,
    pub(crate) auth: Option<AuthFlow>,
    pub(crate) lock: LockGate,
    pub(crate) feed: Option<FeedController>,
    pub(crate) group: Option<GroupPanel>,
    /// Files staged with `/attach`: chat attachments, or the signup photo.
    pub(crate) pending: Vec<Attachment>,
    identity: Option<Identity>,
    session_checked: bool,
    signup_in_progress: bool,
    offline: bool,
    crash: Option<String>,
    notice: Option<String>,
}

impl Shell {
    /// `backend` is `None` when the backend project is not configured.
    pub fn new(
        config: AppConfig,
        backend: Option<Arc<dyn Backend>>,
        prompter: Arc<dyn Prompter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let lock = LockGate::new(config.lock_pin.clone());
        let session = backend.clone().map(SessionStore::new);
        let auth = backend.clone().map(AuthFlow::new);
        Self {
            config,
            backend,
            prompter,
            notifier,
            session,
            auth,
            lock,
            feed: None,
            group: None,
            pending: Vec::new(),
            identity: None,
            session_checked: false,
            signup_in_progress: false,
            offline: false,
            crash: None,
            notice: None,
        }
    }

    pub fn route(&self) -> Route {
        if let Some(message) = &self.crash {
            return Route::Crashed {
                message: message.clone(),
            };
        }
        if self.backend.is_none() {
            return Route::ConfigurationMissing;
        }
        if !self.session_checked {
            return Route::Loading;
        }
        if self.identity.is_none() || self.signup_in_progress {
            return Route::Auth;
        }
        if !self.lock.is_unlocked() {
            return Route::Lock;
        }
        Route::Chat
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn session_store(&self) -> Option<&SessionStore> {
        self.session.as_ref()
    }

    pub fn auth(&self) -> Option<&AuthFlow> {
        self.auth.as_ref()
    }

    pub fn lock_gate(&self) -> &LockGate {
        &self.lock
    }

    pub fn feed(&self) -> Option<&FeedController> {
        self.feed.as_ref()
    }

    pub fn group(&self) -> Option<&GroupPanel> {
        self.group.as_ref()
    }

    pub fn pending(&self) -> &[Attachment] {
        &self.pending
    }

    /// The last backend call failed because the network was unreachable.
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn signup_in_progress(&self) -> bool {
        self.signup_in_progress
    }

    pub(crate) fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    pub(crate) fn clear_notice(&mut self) {
        self.notice = None;
    }

    /// Track reachability from the outcome of a backend call.
    pub(crate) fn observe<T>(&mut self, outcome: &Result<T, ChatError>) {
        match outcome {
            Ok(_) => self.offline = false,
            Err(ChatError::NetworkUnreachable) => {
                if !self.offline {
                    tracing::warn!("backend unreachable, showing offline banner");
                }
                self.offline = true;
            }
            Err(_) => self.offline = false,
        }
    }

    /// Initial session lookup. Until it completes the shell shows `Loading`.
    pub async fn boot(&mut self) {
        let Some(session) = self.session.clone() else {
            tracing::warn!("backend not configured");
            return;
        };
        self.session_checked = false;
        let restored = session.restore().await;
        self.observe(&restored);
        self.identity = match restored {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed");
                None
            }
        };
        self.session_checked = true;
    }

    /// Start over: drop every view controller and look the session up again.
    pub async fn reload(&mut self) {
        tracing::info!("reloading");
        self.teardown_chat();
        self.lock.lock();
        self.crash = None;
        self.notice = None;
        self.pending.clear();
        self.identity = None;
        self.signup_in_progress = false;
        self.auth = self.backend.clone().map(AuthFlow::new);
        self.boot().await;
    }

    /// Forget every piece of local state (the persisted session), then reload.
    pub async fn reset(&mut self) {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.clear_local_state().await {
                tracing::error!(error = %e, "failed to clear local state");
            }
        }
        self.reload().await;
    }

    /// Password login proves the identity, so the lock opens right away.
    pub async fn on_login(&mut self, identity: Identity) {
        self.identity = Some(identity);
        self.lock.unlock();
        self.start_chat().await;
    }

    pub fn begin_signup(&mut self) {
        self.signup_in_progress = true;
    }

    /// Finish a signup. Only a signup that produced a signed-in identity
    /// opens the chat; one awaiting email confirmation stays on `Auth`.
    pub async fn on_signup_complete(&mut self, identity: Option<Identity>) {
        self.signup_in_progress = false;
        let signed_in = self.session.as_ref().and_then(SessionStore::get_session);
        match (identity, signed_in) {
            (Some(identity), Some(_)) => self.on_login(identity).await,
            (Some(identity), None) => {
                tracing::info!(user = %identity.id, "signup awaiting email confirmation");
                self.identity = None;
                self.set_notice("Account created. Confirm your email, then log in.");
            }
            (None, _) => self.identity = None,
        }
    }

    /// Session listener: keep the identity in step with the auth service.
    pub async fn on_session_change(&mut self, identity: Option<Identity>) {
        if self.signup_in_progress {
            tracing::debug!("ignoring session change during signup");
            return;
        }
        match identity {
            None => {
                if self.identity.is_some() {
                    tracing::info!("signed out");
                }
                self.teardown_chat();
                self.lock.lock();
                self.identity = None;
            }
            Some(identity) => {
                let same_user = self.identity.as_ref().map(|i| i.id) == Some(identity.id);
                if !same_user {
                    self.teardown_chat();
                    self.lock.lock();
                }
                if let Some(feed) = self.feed.as_mut() {
                    feed.set_identity(identity.clone());
                }
                self.identity = Some(identity);
            }
        }
    }

    /// Going to the background relocks the app.
    pub fn on_visibility(&mut self, visibility: Visibility) {
        self.lock.on_visibility(visibility);
        if !self.lock.is_unlocked() {
            self.teardown_chat();
        }
    }

    pub async fn unlock_with_pin(&mut self, pin: &str) -> bool {
        match self.lock.try_unlock(pin.trim()) {
            Ok(()) => {
                self.clear_notice();
                self.start_chat().await;
                true
            }
            Err(e) => {
                self.set_notice(format!("{e}. Please try again."));
                false
            }
        }
    }

    /// Sign out, release the feed and relock.
    pub async fn logout(&mut self) {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.sign_out().await {
                tracing::warn!(error = %e, "sign out failed");
            }
        }
        self.teardown_chat();
        self.lock.lock();
        self.identity = None;
        self.pending.clear();
    }

    /// Build the chat controllers once signed in and unlocked.
    pub(crate) async fn start_chat(&mut self) {
        if self.feed.is_some() || !self.lock.is_unlocked() {
            return;
        }
        let (Some(backend), Some(identity)) = (self.backend.clone(), self.identity.clone()) else {
            return;
        };

        let mut feed = FeedController::new(
            Arc::clone(&backend),
            Arc::clone(&self.prompter),
            Arc::clone(&self.notifier),
            identity.clone(),
        );
        let started = feed.start().await;
        self.observe(&started);
        if let Err(e) = started {
            self.set_notice(e.user_message());
        }
        self.feed = Some(feed);

        let mut group = GroupPanel::new(backend, identity, &self.config.group_name);
        group.load_group_settings().await;
        self.group = Some(group);
    }

    fn teardown_chat(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.stop();
            tracing::debug!("chat controllers released");
        }
        self.group = None;
    }

    /// Identity changes made from the group panel flow into new messages.
    pub(crate) fn adopt_identity(&mut self, identity: Identity) {
        if let Some(feed) = self.feed.as_mut() {
            feed.set_identity(identity.clone());
        }
        self.identity = Some(identity);
    }

    /// Next remote change for the chat view; pending forever otherwise.
    pub async fn next_change(&mut self) -> Option<ChangeEvent> {
        match self.feed.as_mut() {
            Some(feed) => feed.next_change().await,
            None => std::future::pending().await,
        }
    }

    pub fn apply_change(&mut self, event: ChangeEvent) {
        if let Some(feed) = self.feed.as_mut() {
            feed.apply(event);
        }
    }

    /// Run one user command. A panic inside the handler is caught and turns
    /// the view into `Crashed`.
    pub async fn dispatch(&mut self, command: Command) -> Flow {
        let outcome = AssertUnwindSafe(commands::execute(self, command))
            .catch_unwind()
            .await;
        match outcome {
            Ok(flow) => flow,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(error = %message, "command handler panicked");
                self.teardown_chat();
                self.crash = Some(message);
                Flow::Continue
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected error".to_string()
    }
}

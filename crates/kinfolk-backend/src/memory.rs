//! In-memory backend.
//!
//! Honors the same contract as [`crate::RestBackend`], including the
//! row-level rules the hosted tables enforce: inserts must be authored by
//! the signed-in user and deletes silently skip rows owned by anybody else.
//! Failure modes can be toggled at runtime and every call is recorded.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};

use kinfolk_shared::constants::{
    DEFAULT_MEDIA_BUCKET, INSUFFICIENT_PRIVILEGE_CODE, UNDEFINED_TABLE_CODE,
};
use kinfolk_shared::{
    AuthEvent, AuthEventKind, ChangeEvent, GroupSettings, Identity, Message, MessageId,
    NewMessage, Participant, ProfileMetadata, ProfileRow, UserId,
};

use crate::error::{BackendError, Result};
use crate::{AuthApi, ChangeFeed, MessageTable, ObjectStorage, Subscription};

const CHANNEL_CAPACITY: usize = 256;
const PUBLIC_BASE: &str = "memory://kinfolk";

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SignIn { email: String },
    SignUp { email: String },
    SignOut,
    RestoreSession,
    PasswordReset { email: String },
    ResendConfirmation { email: String },
    UpdateProfile,
    ClearLocalState,
    SelectMessages,
    SelectAuthors,
    Insert { text: String, media: bool },
    Delete { ids: Vec<MessageId> },
    Probe,
    InsertProfile { id: UserId },
    FetchGroupSettings,
    Upload { path: String, content_type: String, size: usize },
    Subscribe,
}

struct Account {
    password: String,
    identity: Identity,
    confirmed: bool,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    current: Option<Identity>,
    messages: Vec<Message>,
    profiles: Vec<ProfileRow>,
    objects: HashMap<String, (String, Bytes)>,
    group_settings: Option<GroupSettings>,
    schema_missing: bool,
    unreachable: bool,
    fail_uploads: bool,
    /// Inserts still allowed before every further insert fails.
    inserts_before_failure: Option<usize>,
    require_confirmation: bool,
    next_auth_failure: Option<String>,
    calls: Vec<Call>,
}

pub struct MemoryBackend {
    state: Mutex<State>,
    changes: broadcast::Sender<ChangeEvent>,
    auth_events: broadcast::Sender<AuthEvent>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (auth_events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            changes,
            auth_events,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }

    fn emit_auth(&self, kind: AuthEventKind, identity: Option<Identity>) {
        let _ = self.auth_events.send(AuthEvent { kind, identity });
    }

    fn emit_change(&self, event: ChangeEvent) {
        let _ = self.changes.send(event);
    }

    fn reachable(&self) -> Result<()> {
        if self.state().unreachable {
            return Err(BackendError::Unreachable("connection refused".into()));
        }
        Ok(())
    }

    fn table_exists(&self) -> Result<()> {
        self.reachable()?;
        if self.state().schema_missing {
            return Err(BackendError::Api {
                status: 404,
                code: Some(UNDEFINED_TABLE_CODE.to_string()),
                message: "relation \"public.messages\" does not exist".into(),
            });
        }
        Ok(())
    }

    fn take_auth_failure(&self) -> Result<()> {
        self.reachable()?;
        match self.state().next_auth_failure.take() {
            Some(message) => Err(BackendError::Api {
                status: 400,
                code: None,
                message,
            }),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Fixtures and failure injection
    // -----------------------------------------------------------------------

    /// Register a confirmed account and return its identity.
    pub fn with_account(&self, email: &str, password: &str, display_name: &str) -> Identity {
        let identity = Identity {
            id: UserId::new(),
            email: Some(email.to_string()),
            display_name: Some(display_name.to_string()),
            photo_url: None,
        };
        self.state().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
                confirmed: true,
            },
        );
        identity
    }

    /// Mark an account's email as confirmed.
    pub fn confirm_email(&self, email: &str) {
        if let Some(account) = self.state().accounts.get_mut(email) {
            account.confirmed = true;
        }
    }

    /// Store a message without emitting a change event.
    pub fn seed_message(&self, author: &Identity, text: &str) -> Message {
        let message = NewMessage::text(author, text).into_message(MessageId::new(), self.now());
        self.state().messages.push(message.clone());
        message
    }

    /// Simulate another client inserting a row.
    pub fn push_remote_insert(&self, author: &Identity, text: &str) -> Message {
        let message = self.seed_message(author, text);
        self.emit_change(ChangeEvent::Insert(message.clone()));
        message
    }

    /// Simulate another client deleting a row.
    pub fn push_remote_delete(&self, id: MessageId) {
        self.state().messages.retain(|m| m.id != id);
        self.emit_change(ChangeEvent::Delete(id));
    }

    /// Deliver a change event without touching the table (late or
    /// duplicated deliveries).
    pub fn replay(&self, event: ChangeEvent) {
        self.emit_change(event);
    }

    pub fn set_schema_missing(&self, missing: bool) {
        self.state().schema_missing = missing;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.state().fail_uploads = fail;
    }

    /// Let `count` more inserts through, then fail the rest as unreachable.
    pub fn fail_inserts_after(&self, count: usize) {
        self.state().inserts_before_failure = Some(count);
    }

    /// New signups must confirm their email before they can sign in.
    pub fn set_require_confirmation(&self, required: bool) {
        self.state().require_confirmation = required;
    }

    /// The next auth-service call fails with this message.
    pub fn fail_next_auth(&self, message: &str) {
        self.state().next_auth_failure = Some(message.to_string());
    }

    pub fn set_group_settings(&self, settings: GroupSettings) {
        self.state().group_settings = Some(settings);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Rows currently in the table, in insertion order.
    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    pub fn profiles(&self) -> Vec<ProfileRow> {
        self.state().profiles.clone()
    }

    pub fn object_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.state().objects.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of change-feed receivers still attached.
    pub fn live_subscriptions(&self) -> usize {
        self.changes.receiver_count()
    }

    /// Strictly increasing timestamps so ordering by `created_at` matches
    /// insertion order.
    fn now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.state().messages.iter().filter_map(|m| m.created_at).max() {
            Some(last) if last >= now => last + chrono::Duration::microseconds(1),
            _ => now,
        }
    }
}

#[async_trait]
impl AuthApi for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        self.record(Call::SignIn {
            email: email.to_string(),
        });
        self.take_auth_failure()?;

        let identity = {
            let mut state = self.state();
            let account = state
                .accounts
                .get(email)
                .filter(|a| a.password == password)
                .ok_or_else(|| BackendError::Api {
                    status: 400,
                    code: Some("invalid_credentials".into()),
                    message: "Invalid login credentials".into(),
                })?;
            if !account.confirmed {
                return Err(BackendError::Api {
                    status: 400,
                    code: Some("email_not_confirmed".into()),
                    message: "Email not confirmed".into(),
                });
            }
            let identity = account.identity.clone();
            state.current = Some(identity.clone());
            identity
        };

        self.emit_auth(AuthEventKind::SignedIn, Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &ProfileMetadata,
    ) -> Result<Identity> {
        self.record(Call::SignUp {
            email: email.to_string(),
        });
        self.take_auth_failure()?;

        let (identity, signed_in) = {
            let mut state = self.state();
            if state.accounts.contains_key(email) {
                return Err(BackendError::Api {
                    status: 422,
                    code: Some("user_already_exists".into()),
                    message: "User already registered".into(),
                });
            }
            let identity = Identity {
                id: UserId::new(),
                email: Some(email.to_string()),
                display_name: metadata.display_name.clone(),
                photo_url: metadata.photo_url.clone(),
            };
            let confirmed = !state.require_confirmation;
            state.accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    identity: identity.clone(),
                    confirmed,
                },
            );
            if confirmed {
                state.current = Some(identity.clone());
            }
            (identity, confirmed)
        };

        if signed_in {
            self.emit_auth(AuthEventKind::SignedIn, Some(identity.clone()));
        }
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<()> {
        self.record(Call::SignOut);
        let had_session = self.state().current.take().is_some();
        if had_session {
            self.emit_auth(AuthEventKind::SignedOut, None);
        }
        Ok(())
    }

    async fn restore_session(&self) -> Result<Option<Identity>> {
        self.record(Call::RestoreSession);
        Ok(self.state().current.clone())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.state().current.clone()
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }

    async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.record(Call::PasswordReset {
            email: email.to_string(),
        });
        self.take_auth_failure()
    }

    async fn resend_confirmation(&self, email: &str) -> Result<()> {
        self.record(Call::ResendConfirmation {
            email: email.to_string(),
        });
        self.take_auth_failure()
    }

    async fn update_profile_metadata(&self, metadata: &ProfileMetadata) -> Result<Identity> {
        self.record(Call::UpdateProfile);
        self.take_auth_failure()?;

        let identity = {
            let mut state = self.state();
            let mut identity = state.current.clone().ok_or(BackendError::NotSignedIn)?;
            if let Some(name) = &metadata.display_name {
                identity.display_name = Some(name.clone());
            }
            if let Some(photo) = &metadata.photo_url {
                identity.photo_url = Some(photo.clone());
            }
            if let Some(account) = state
                .accounts
                .values_mut()
                .find(|a| a.identity.id == identity.id)
            {
                account.identity = identity.clone();
            }
            state.current = Some(identity.clone());
            identity
        };

        self.emit_auth(AuthEventKind::UserUpdated, Some(identity.clone()));
        Ok(identity)
    }

    async fn clear_local_state(&self) -> Result<()> {
        self.record(Call::ClearLocalState);
        let had_session = self.state().current.take().is_some();
        if had_session {
            self.emit_auth(AuthEventKind::SignedOut, None);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageTable for MemoryBackend {
    async fn select_messages(&self) -> Result<Vec<Message>> {
        self.record(Call::SelectMessages);
        self.table_exists()?;
        let mut messages = self.state().messages.clone();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn select_authors(&self) -> Result<Vec<Participant>> {
        self.record(Call::SelectAuthors);
        self.table_exists()?;
        let mut messages = self.state().messages.clone();
        messages.sort_by_key(|m| std::cmp::Reverse(m.created_at));
        Ok(messages.iter().map(Message::participant).collect())
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        self.record(Call::Insert {
            text: message.body().to_string(),
            media: message.media_url().is_some(),
        });
        self.table_exists()?;
        if let Some(left) = self.state().inserts_before_failure.as_mut() {
            if *left == 0 {
                return Err(BackendError::Unreachable("connection reset".into()));
            }
            *left -= 1;
        }

        let author_matches = self
            .state()
            .current
            .as_ref()
            .is_some_and(|me| me.id == message.author_id());
        if !author_matches {
            return Err(BackendError::Api {
                status: 403,
                code: Some(INSUFFICIENT_PRIVILEGE_CODE.to_string()),
                message: "new row violates row-level security policy for table \"messages\"".into(),
            });
        }

        let stored = message.clone().into_message(MessageId::new(), self.now());
        self.state().messages.push(stored.clone());
        self.emit_change(ChangeEvent::Insert(stored.clone()));
        Ok(stored)
    }

    async fn delete_messages(&self, ids: &[MessageId], owner: UserId) -> Result<Vec<MessageId>> {
        self.record(Call::Delete { ids: ids.to_vec() });
        self.table_exists()?;

        let deleted: Vec<MessageId> = {
            let mut state = self.state();
            // Row-level policy: only the signed-in author's own rows.
            let allowed = state.current.as_ref().is_some_and(|me| me.id == owner);
            if !allowed {
                return Ok(Vec::new());
            }
            let deleted: Vec<MessageId> = state
                .messages
                .iter()
                .filter(|m| ids.contains(&m.id) && m.author_id == owner)
                .map(|m| m.id)
                .collect();
            state.messages.retain(|m| !deleted.contains(&m.id));
            deleted
        };

        for id in &deleted {
            self.emit_change(ChangeEvent::Delete(*id));
        }
        Ok(deleted)
    }

    async fn probe(&self) -> Result<()> {
        self.record(Call::Probe);
        self.table_exists()
    }

    async fn insert_profile(&self, profile: &ProfileRow) -> Result<()> {
        self.record(Call::InsertProfile { id: profile.id });
        self.reachable()?;
        self.state().profiles.push(profile.clone());
        Ok(())
    }

    async fn fetch_group_settings(&self) -> Result<Option<GroupSettings>> {
        self.record(Call::FetchGroupSettings);
        self.reachable()?;
        Ok(self.state().group_settings.clone())
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(&self, path: &str, content_type: &str, bytes: Bytes) -> Result<()> {
        self.record(Call::Upload {
            path: path.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len(),
        });
        self.reachable()?;
        if self.state().fail_uploads {
            return Err(BackendError::Api {
                status: 413,
                code: None,
                message: "The object exceeded the maximum allowed size".into(),
            });
        }
        self.state()
            .objects
            .insert(path.to_string(), (content_type.to_string(), bytes));
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{PUBLIC_BASE}/storage/v1/object/public/{DEFAULT_MEDIA_BUCKET}/{path}")
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self) -> Result<Subscription> {
        self.record(Call::Subscribe);
        self.reachable()?;

        let mut source = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription::new(rx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinfolk_shared::ChatError;

    #[tokio::test]
    async fn test_delete_is_owner_only() {
        let backend = MemoryBackend::new();
        let mum = backend.with_account("mum@example.com", "pw", "Mum");
        let dad = backend.with_account("dad@example.com", "pw", "Dad");
        let dads = backend.seed_message(&dad, "hello");

        backend.sign_in("mum@example.com", "pw").await.unwrap();
        let deleted = backend.delete_messages(&[dads.id], mum.id).await.unwrap();
        assert!(deleted.is_empty());
        // Claiming to be the owner doesn't get past the policy either.
        let deleted = backend.delete_messages(&[dads.id], dad.id).await.unwrap();
        assert!(deleted.is_empty());
        assert_eq!(backend.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_requires_matching_author() {
        let backend = MemoryBackend::new();
        let mum = backend.with_account("mum@example.com", "pw", "Mum");
        let err = backend
            .insert_message(&NewMessage::text(&mum, "hi"))
            .await
            .unwrap_err();
        assert_eq!(ChatError::from(err), ChatError::PermissionDenied);

        backend.sign_in("mum@example.com", "pw").await.unwrap();
        let stored = backend
            .insert_message(&NewMessage::text(&mum, "hi"))
            .await
            .unwrap();
        assert!(stored.created_at.is_some());
    }

    #[tokio::test]
    async fn test_unconfirmed_signup_cannot_sign_in() {
        let backend = MemoryBackend::new();
        backend.set_require_confirmation(true);
        let meta = ProfileMetadata {
            display_name: Some("Kid".into()),
            photo_url: None,
        };
        backend.sign_up("kid@example.com", "pw", &meta).await.unwrap();
        assert!(backend.current_identity().is_none());

        let err = backend.sign_in("kid@example.com", "pw").await.unwrap_err();
        assert_eq!(ChatError::from(err), ChatError::EmailUnconfirmed);

        backend.confirm_email("kid@example.com");
        backend.sign_in("kid@example.com", "pw").await.unwrap();
    }

    #[tokio::test]
    async fn test_schema_missing_classifies() {
        let backend = MemoryBackend::new();
        backend.set_schema_missing(true);
        let err = backend.select_messages().await.unwrap_err();
        assert_eq!(ChatError::from(err), ChatError::SchemaMissing);
    }

    #[tokio::test]
    async fn test_subscription_forwards_in_order() {
        let backend = MemoryBackend::new();
        let dad = backend.with_account("dad@example.com", "pw", "Dad");
        let mut sub = backend.subscribe().await.unwrap();

        let first = backend.push_remote_insert(&dad, "one");
        let second = backend.push_remote_insert(&dad, "two");
        backend.push_remote_delete(first.id);

        assert_eq!(sub.recv().await, Some(ChangeEvent::Insert(first.clone())));
        assert_eq!(sub.recv().await, Some(ChangeEvent::Insert(second)));
        assert_eq!(sub.recv().await, Some(ChangeEvent::Delete(first.id)));
    }

    #[tokio::test]
    async fn test_auth_failure_is_one_shot() {
        let backend = MemoryBackend::new();
        backend.fail_next_auth("email rate limit exceeded");
        assert!(backend.request_password_reset("a@example.com").await.is_err());
        assert!(backend.request_password_reset("a@example.com").await.is_ok());
    }
}

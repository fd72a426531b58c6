//! Message feed controller.
//!
//! Owns the ordered message list, the change-feed subscription and the
//! selection set. Every mutation runs on the caller's task: remote events
//! are pulled with [`FeedController::next_change`] and applied with
//! [`FeedController::apply`] by the same loop that handles user commands.

mod selection;
mod timeline;

pub use selection::Selection;
pub use timeline::Timeline;

use std::sync::Arc;

use uuid::Uuid;

use kinfolk_backend::{Backend, Subscription};
use kinfolk_shared::constants::MAX_ATTACHMENT_SIZE;
use kinfolk_shared::error::Result;
use kinfolk_shared::{Attachment, ChangeEvent, ChatError, Identity, Message, MessageId, NewMessage};

use crate::notify::Notifier;
use crate::prompt::Prompter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Loading,
    Ready,
    /// The message table does not exist; the setup guide applies.
    MissingSchema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The user did not confirm.
    Declined,
    Deleted(usize),
}

pub struct FeedController {
    backend: Arc<dyn Backend>,
    prompter: Arc<dyn Prompter>,
    notifier: Arc<dyn Notifier>,
    identity: Identity,
    state: FeedState,
    timeline: Timeline,
    selection: Selection,
    subscription: Option<Subscription>,
    notifications_allowed: bool,
}

impl FeedController {
    pub fn new(
        backend: Arc<dyn Backend>,
        prompter: Arc<dyn Prompter>,
        notifier: Arc<dyn Notifier>,
        identity: Identity,
    ) -> Self {
        Self {
            backend,
            prompter,
            notifier,
            identity,
            state: FeedState::Loading,
            timeline: Timeline::default(),
            selection: Selection::default(),
            subscription: None,
            notifications_allowed: false,
        }
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.timeline.messages()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Profile edits change the snapshot stamped on future messages.
    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    /// Subscribe to changes, then load the history.
    ///
    /// A missing message table releases the subscription again; nothing is
    /// retried until the user asks.
    pub async fn start(&mut self) -> Result<()> {
        self.notifications_allowed = self.notifier.request_permission();
        self.subscribe_to_changes().await;
        let loaded = self.load().await;
        if self.state == FeedState::MissingSchema {
            self.stop();
        }
        loaded
    }

    /// Acquire the change-feed subscription unless one is already held.
    pub async fn subscribe_to_changes(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        match self.backend.subscribe().await {
            Ok(subscription) => {
                tracing::info!("subscribed to message changes");
                self.subscription = Some(subscription);
            }
            Err(e) => tracing::warn!(error = %e, "change feed unavailable"),
        }
    }

    /// Fetch the full history, oldest first.
    ///
    /// Errors other than a missing table leave an empty, ready list and are
    /// returned for the caller to surface.
    pub async fn load(&mut self) -> Result<()> {
        self.state = FeedState::Loading;
        match self.backend.select_messages().await.map_err(ChatError::from) {
            Ok(messages) => {
                tracing::debug!(count = messages.len(), "feed loaded");
                self.timeline.replace_all(messages);
                self.state = FeedState::Ready;
                Ok(())
            }
            Err(ChatError::SchemaMissing) => {
                tracing::warn!("message table missing, showing setup guide");
                self.timeline.clear();
                self.state = FeedState::MissingSchema;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load messages");
                self.timeline.clear();
                self.state = FeedState::Ready;
                Err(e)
            }
        }
    }

    /// Wait for the next remote change. Pending forever without a
    /// subscription, so it can sit in a `select!` unconditionally.
    pub async fn next_change(&mut self) -> Option<ChangeEvent> {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };
        let event = subscription.recv().await;
        if event.is_none() {
            tracing::warn!("change feed closed");
            self.subscription = None;
        }
        event
    }

    /// Apply a remote change to the list.
    pub fn apply(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Insert(message) => {
                let from_other = message.author_id != self.identity.id;
                let notice = from_other.then(|| notice_for(&message));
                if self.timeline.append(message) {
                    if let Some((title, body)) = notice {
                        self.notify(&title, &body);
                    }
                }
            }
            ChangeEvent::Delete(id) => {
                self.timeline.remove(id);
                self.selection.forget(id);
            }
        }
    }

    /// Send a text and/or attachments.
    ///
    /// The text row goes first, then one row per attachment, one after the
    /// other. Each attachment leaves `attachments` once its row is stored,
    /// so after a failure the vector holds exactly the ones still unsent.
    /// The first failure stops the rest and raises an alert; rows already
    /// inserted stay. Returns how many rows were inserted.
    pub async fn send(&mut self, text: &str, attachments: &mut Vec<Attachment>) -> Result<usize> {
        let text = text.trim();
        if text.is_empty() && attachments.is_empty() {
            return Ok(0);
        }

        match self.try_send(text, attachments).await {
            Ok(count) => Ok(count),
            Err(e) => {
                tracing::error!(error = %e, "send failed");
                self.prompter.alert(&e.user_message()).await;
                Err(e)
            }
        }
    }

    async fn try_send(&mut self, text: &str, attachments: &mut Vec<Attachment>) -> Result<usize> {
        if let Some(big) = attachments.iter().find(|a| a.size() > MAX_ATTACHMENT_SIZE) {
            return Err(ChatError::UploadFailed(format!(
                "{} is larger than {} MB",
                big.file_name,
                MAX_ATTACHMENT_SIZE / (1024 * 1024)
            )));
        }

        let mut inserted = 0;
        if !text.is_empty() {
            let stored = self
                .backend
                .insert_message(&NewMessage::text(&self.identity, text))
                .await?;
            self.timeline.append(stored);
            inserted += 1;
        }

        while let Some(attachment) = attachments.first() {
            let url = self.upload_attachment(attachment).await?;
            let payload = NewMessage::media(
                &self.identity,
                url,
                attachment.kind(),
                attachment.size() as i64,
            );
            let stored = self.backend.insert_message(&payload).await?;
            attachments.remove(0);
            self.timeline.append(stored);
            inserted += 1;
        }

        tracing::info!(rows = inserted, "message sent");
        Ok(inserted)
    }

    async fn upload_attachment(&self, attachment: &Attachment) -> Result<String> {
        let path = format!("{}.{}", Uuid::new_v4(), attachment.extension());
        self.backend
            .upload(&path, &attachment.content_type, attachment.bytes.clone())
            .await
            .map_err(|e| ChatError::UploadFailed(ChatError::from(e).to_string()))?;
        Ok(self.backend.public_url(&path))
    }

    pub async fn delete(&mut self, id: MessageId) -> Result<DeleteOutcome> {
        self.delete_many(&[id]).await
    }

    /// Delete own messages after confirmation.
    ///
    /// Rows the backend refuses (someone else's) stay in place and the call
    /// reports `PermissionDenied`.
    pub async fn delete_many(&mut self, ids: &[MessageId]) -> Result<DeleteOutcome> {
        if ids.is_empty() {
            return Ok(DeleteOutcome::Deleted(0));
        }
        let question = match (ids, self.timeline.get(ids[0])) {
            ([_], Some(target)) => delete_question(target, self.identity.id),
            ([_], None) => "Delete this message?".to_string(),
            _ => format!("Delete {} messages?", ids.len()),
        };
        if !self.prompter.confirm(&question).await {
            return Ok(DeleteOutcome::Declined);
        }

        let deleted = match self.backend.delete_messages(ids, self.identity.id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                let e = ChatError::from(e);
                tracing::error!(error = %e, "delete failed");
                self.prompter.alert(&e.user_message()).await;
                return Err(e);
            }
        };

        for id in &deleted {
            self.timeline.remove(*id);
            self.selection.forget(*id);
        }

        if deleted.len() < ids.len() {
            tracing::warn!(
                requested = ids.len(),
                deleted = deleted.len(),
                "delete refused for some rows"
            );
            let e = ChatError::PermissionDenied;
            self.prompter.alert(&e.user_message()).await;
            return Err(e);
        }
        Ok(DeleteOutcome::Deleted(deleted.len()))
    }

    pub fn long_press(&mut self, id: MessageId) {
        if self.timeline.contains(id) {
            self.selection.long_press(id);
        }
    }

    pub fn tap(&mut self, id: MessageId) {
        if self.timeline.contains(id) {
            self.selection.tap(id);
        }
    }

    pub fn cancel_selection(&mut self) {
        self.selection.cancel();
    }

    pub async fn delete_selected(&mut self) -> Result<DeleteOutcome> {
        let ids = self.selection.ids().to_vec();
        let outcome = self.delete_many(&ids).await?;
        if let DeleteOutcome::Deleted(_) = outcome {
            self.selection.cancel();
        }
        Ok(outcome)
    }

    /// Release the change-feed subscription.
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn notify(&self, title: &str, body: &str) {
        if !self.notifications_allowed {
            return;
        }
        if let Err(e) = self.notifier.notify(title, body) {
            tracing::debug!(error = %e, "notification failed");
        }
        if let Err(e) = self.notifier.chime() {
            tracing::debug!(error = %e, "chime failed");
        }
    }
}

fn notice_for(message: &Message) -> (String, String) {
    let title = format!("New message from {}", message.author_label());
    let body = if message.text.is_empty() {
        "Sent a photo/video".to_string()
    } else {
        message.text.clone()
    };
    (title, body)
}

/// Characters of text quoted back in a delete confirmation.
const EXCERPT_CHARS: usize = 40;

/// Names the author and quotes the row, so the user sees which message a
/// number resolved to.
fn delete_question(message: &Message, me: kinfolk_shared::UserId) -> String {
    let whose = if message.author_id == me {
        "your message".to_string()
    } else {
        format!("{}'s message", message.author_label())
    };
    let text = message.text.trim();
    if text.is_empty() {
        return format!("Delete {whose} (photo/video)?");
    }
    let mut excerpt: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        excerpt.push_str("...");
    }
    format!("Delete {whose} \"{excerpt}\"?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinfolk_backend::memory::Call;
    use kinfolk_backend::{AuthApi, MemoryBackend};

    use crate::notify::RecordingNotifier;
    use crate::prompt::ScriptedPrompter;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        prompter: Arc<ScriptedPrompter>,
        notifier: Arc<RecordingNotifier>,
        me: Identity,
        other: Identity,
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let me = backend.with_account("me@example.com", "pw", "Me");
        let other = backend.with_account("bua@example.com", "pw", "Bua");
        backend.sign_in("me@example.com", "pw").await.unwrap();
        Fixture {
            backend,
            prompter: Arc::new(ScriptedPrompter::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            me,
            other,
        }
    }

    fn controller(f: &Fixture) -> FeedController {
        FeedController::new(
            f.backend.clone(),
            f.prompter.clone(),
            f.notifier.clone(),
            f.me.clone(),
        )
    }

    #[tokio::test]
    async fn test_start_loads_history_in_order() {
        let f = fixture().await;
        f.backend.seed_message(&f.other, "first");
        f.backend.seed_message(&f.me, "second");

        let mut feed = controller(&f);
        feed.start().await.unwrap();

        assert_eq!(feed.state(), FeedState::Ready);
        assert!(feed.is_subscribed());
        let texts: Vec<&str> = feed.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
    }

    #[tokio::test]
    async fn test_notifies_only_for_others() {
        let f = fixture().await;
        let mut feed = controller(&f);
        feed.start().await.unwrap();

        let theirs = f.backend.push_remote_insert(&f.other, "hello beta");
        let event = feed.next_change().await.unwrap();
        feed.apply(event);
        assert_eq!(feed.messages().last().map(|m| m.id), Some(theirs.id));

        feed.send("hi bua", &mut Vec::new()).await.unwrap();
        // Our own insert comes back through the feed and is deduplicated.
        let echo = feed.next_change().await.unwrap();
        feed.apply(echo);
        assert_eq!(feed.messages().len(), 2);

        assert_eq!(
            f.notifier.notices(),
            vec![("New message from Bua".to_string(), "hello beta".to_string())]
        );
        assert_eq!(f.notifier.chimes(), 1);
    }

    #[test]
    fn test_media_notice_body() {
        let message = NewMessage::media(
            &Identity {
                id: kinfolk_shared::UserId::new(),
                email: None,
                display_name: None,
                photo_url: None,
            },
            "https://x/y.mp4",
            kinfolk_shared::MediaKind::Video,
            10,
        )
        .into_message(MessageId::new(), chrono::Utc::now());
        let (title, body) = notice_for(&message);
        assert_eq!(title, "New message from Unknown");
        assert_eq!(body, "Sent a photo/video");
    }

    #[tokio::test]
    async fn test_send_uploads_then_inserts() {
        let f = fixture().await;
        let mut feed = controller(&f);
        feed.start().await.unwrap();
        f.backend.clear_calls();

        let clip = Attachment::new("clip.mp4", "video/mp4", vec![0u8; 32]);
        let mut staged = vec![clip];
        let rows = feed.send("", &mut staged).await.unwrap();
        assert_eq!(rows, 1);
        assert!(staged.is_empty());

        let calls = f.backend.calls();
        assert!(matches!(&calls[0], Call::Upload { path, content_type, size: 32 }
            if path.ends_with(".mp4") && content_type == "video/mp4"));
        assert_eq!(calls[1], Call::Insert { text: String::new(), media: true });

        let stored = feed.messages().last().unwrap();
        assert_eq!(stored.media_kind, Some(kinfolk_shared::MediaKind::Video));
        assert_eq!(stored.media_size, Some(32));
        assert!(stored.text.is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_alerts_and_keeps_text_row() {
        let f = fixture().await;
        let mut feed = controller(&f);
        feed.start().await.unwrap();
        f.backend.set_fail_uploads(true);

        let photo = Attachment::new("cat.png", "image/png", vec![1u8; 8]);
        let mut staged = vec![photo];
        let err = feed.send("look", &mut staged).await.unwrap_err();
        assert!(matches!(err, ChatError::UploadFailed(_)));
        assert_eq!(staged.len(), 1);

        assert_eq!(f.prompter.alerts().len(), 1);
        assert_eq!(f.backend.messages().len(), 1);
        assert_eq!(feed.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_attachment_is_rejected_before_any_call() {
        let f = fixture().await;
        let mut feed = controller(&f);
        feed.start().await.unwrap();
        f.backend.clear_calls();

        let huge = Attachment::new("movie.mp4", "video/mp4", vec![0u8; MAX_ATTACHMENT_SIZE + 1]);
        let mut staged = vec![huge];
        assert!(feed.send("watch", &mut staged).await.is_err());
        assert!(f.backend.calls().is_empty());
        assert_eq!(staged.len(), 1);
    }

    #[tokio::test]
    async fn test_declined_delete_is_noop() {
        let f = fixture().await;
        let mine = f.backend.seed_message(&f.me, "oops");
        let mut feed = controller(&f);
        feed.start().await.unwrap();
        f.backend.clear_calls();

        f.prompter.answer(false);
        assert_eq!(feed.delete(mine.id).await.unwrap(), DeleteOutcome::Declined);
        assert!(f.backend.calls().is_empty());
        assert_eq!(feed.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_second_attachment_stays_staged_when_its_insert_fails() {
        let f = fixture().await;
        let mut feed = controller(&f);
        feed.start().await.unwrap();

        let mut staged = vec![
            Attachment::new("a.png", "image/png", vec![1u8; 8]),
            Attachment::new("b.png", "image/png", vec![2u8; 8]),
        ];
        f.backend.fail_inserts_after(1);
        assert!(feed.send("", &mut staged).await.is_err());
        assert_eq!(feed.messages().len(), 1);
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].file_name, "b.png");
    }

    #[test]
    fn test_delete_question_names_the_target() {
        let me = Identity {
            id: kinfolk_shared::UserId::new(),
            email: None,
            display_name: Some("Me".into()),
            photo_url: None,
        };
        let dadi = Identity {
            id: kinfolk_shared::UserId::new(),
            email: None,
            display_name: Some("Dadi".into()),
            photo_url: None,
        };
        let mine = NewMessage::text(&me, "  see you at eight  ")
            .into_message(MessageId::new(), chrono::Utc::now());
        assert_eq!(delete_question(&mine, me.id), "Delete your message \"see you at eight\"?");

        let long = "a".repeat(EXCERPT_CHARS + 5);
        let theirs = NewMessage::text(&dadi, &long).into_message(MessageId::new(), chrono::Utc::now());
        assert_eq!(
            delete_question(&theirs, me.id),
            format!("Delete Dadi's message \"{}...\"?", "a".repeat(EXCERPT_CHARS))
        );

        let clip = NewMessage::media(&dadi, "https://x/y.mp4", kinfolk_shared::MediaKind::Video, 10)
            .into_message(MessageId::new(), chrono::Utc::now());
        assert_eq!(delete_question(&clip, me.id), "Delete Dadi's message (photo/video)?");
    }

    #[tokio::test]
    async fn test_partial_batch_delete() {
        let f = fixture().await;
        let mine = f.backend.seed_message(&f.me, "mine");
        let theirs = f.backend.seed_message(&f.other, "theirs");
        let mut feed = controller(&f);
        feed.start().await.unwrap();

        feed.long_press(mine.id);
        feed.tap(theirs.id);
        assert_eq!(feed.selection().len(), 2);

        f.prompter.answer(true);
        let err = feed.delete_selected().await.unwrap_err();
        assert_eq!(err, ChatError::PermissionDenied);

        let left: Vec<MessageId> = feed.messages().iter().map(|m| m.id).collect();
        assert_eq!(left, vec![theirs.id]);
        assert_eq!(f.prompter.questions(), vec!["Delete 2 messages?".to_string()]);
        // Still selecting what could not be deleted.
        assert_eq!(feed.selection().ids(), &[theirs.id]);
    }

    #[tokio::test]
    async fn test_delete_selected_clears_selection() {
        let f = fixture().await;
        let a = f.backend.seed_message(&f.me, "a");
        let b = f.backend.seed_message(&f.me, "b");
        let mut feed = controller(&f);
        feed.start().await.unwrap();

        feed.long_press(a.id);
        feed.tap(b.id);
        f.prompter.answer(true);
        assert_eq!(feed.delete_selected().await.unwrap(), DeleteOutcome::Deleted(2));
        assert!(!feed.selection().is_active());
        assert!(feed.messages().is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_leaves_empty_ready_list() {
        let f = fixture().await;
        f.backend.seed_message(&f.me, "a");
        let mut feed = controller(&f);
        f.backend.set_unreachable(true);

        let err = feed.start().await.unwrap_err();
        assert_eq!(err, ChatError::NetworkUnreachable);
        assert_eq!(feed.state(), FeedState::Ready);
        assert!(feed.messages().is_empty());
    }

    #[tokio::test]
    async fn test_stop_releases_subscription() {
        let f = fixture().await;
        let mut feed = controller(&f);
        feed.start().await.unwrap();
        assert!(feed.is_subscribed());

        feed.stop();
        assert!(!feed.is_subscribed());
        for _ in 0..10 {
            if f.backend.live_subscriptions() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.backend.live_subscriptions(), 0);
    }
}

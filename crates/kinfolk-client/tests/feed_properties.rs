//! Feed and auth behaviour against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use kinfolk_backend::memory::Call;
use kinfolk_backend::{AuthApi, MemoryBackend};
use kinfolk_client::auth::AuthFlow;
use kinfolk_client::feed::{FeedController, FeedState};
use kinfolk_client::notify::RecordingNotifier;
use kinfolk_client::prompt::ScriptedPrompter;
use kinfolk_shared::{Attachment, ChangeEvent, ChatError, Identity, MessageId};

struct Family {
    backend: Arc<MemoryBackend>,
    prompter: Arc<ScriptedPrompter>,
    me: Identity,
    cousin: Identity,
}

async fn family() -> Family {
    let backend = Arc::new(MemoryBackend::new());
    let me = backend.with_account("me@example.com", "pw", "Me");
    let cousin = backend.with_account("cousin@example.com", "pw", "Cousin");
    backend.sign_in("me@example.com", "pw").await.unwrap();
    Family {
        backend,
        prompter: Arc::new(ScriptedPrompter::default()),
        me,
        cousin,
    }
}

fn feed(f: &Family) -> FeedController {
    FeedController::new(
        f.backend.clone(),
        f.prompter.clone(),
        Arc::new(RecordingNotifier::default()),
        f.me.clone(),
    )
}

async fn pump(feed: &mut FeedController, events: usize) {
    for _ in 0..events {
        let event = feed.next_change().await.expect("change feed open");
        feed.apply(event);
    }
}

fn ids(feed: &FeedController) -> Vec<MessageId> {
    feed.messages().iter().map(|m| m.id).collect()
}

#[tokio::test]
async fn inserts_grow_the_list_one_at_a_time_in_order() {
    let f = family().await;
    let mut feed = feed(&f);
    feed.start().await.unwrap();

    let mut expected = Vec::new();
    for text in ["one", "two", "three"] {
        let before = feed.messages().len();
        expected.push(f.backend.push_remote_insert(&f.cousin, text).id);
        pump(&mut feed, 1).await;
        assert_eq!(feed.messages().len(), before + 1);
    }
    assert_eq!(ids(&feed), expected);

    // A redelivered insert is ignored.
    let again = feed.messages()[0].clone();
    f.backend.replay(ChangeEvent::Insert(again));
    pump(&mut feed, 1).await;
    assert_eq!(ids(&feed), expected);
}

#[tokio::test]
async fn delete_events_remove_exactly_that_id() {
    let f = family().await;
    let a = f.backend.seed_message(&f.cousin, "a");
    let b = f.backend.seed_message(&f.cousin, "b");
    let c = f.backend.seed_message(&f.me, "c");
    let mut feed = feed(&f);
    feed.start().await.unwrap();

    f.backend.push_remote_delete(b.id);
    pump(&mut feed, 1).await;
    assert_eq!(ids(&feed), vec![a.id, c.id]);

    // A late insert for a deleted row does not bring it back.
    f.backend.replay(ChangeEvent::Insert(b));
    pump(&mut feed, 1).await;
    assert_eq!(ids(&feed), vec![a.id, c.id]);
}

#[tokio::test]
async fn own_delete_is_not_undone_by_a_late_insert() {
    let f = family().await;
    let keep = f.backend.seed_message(&f.me, "keep");
    let gone = f.backend.seed_message(&f.me, "typo");
    let mut feed = feed(&f);
    feed.start().await.unwrap();

    f.prompter.answer(true);
    feed.delete(gone.id).await.unwrap();
    // The delete's own echo, then a stale insert for the same row.
    pump(&mut feed, 1).await;
    f.backend.replay(ChangeEvent::Insert(gone.clone()));
    pump(&mut feed, 1).await;

    assert_eq!(ids(&feed), vec![keep.id]);
    assert!(f.backend.messages().iter().all(|m| m.id != gone.id));
}

#[tokio::test]
async fn blank_send_makes_no_backend_call() {
    let f = family().await;
    let mut feed = feed(&f);
    feed.start().await.unwrap();
    f.backend.clear_calls();

    assert_eq!(feed.send("   \n\t", &mut Vec::new()).await.unwrap(), 0);
    assert!(f.backend.calls().is_empty());
    assert!(feed.messages().is_empty());
}

#[tokio::test]
async fn deleting_someone_elses_message_is_denied() {
    let f = family().await;
    let theirs = f.backend.seed_message(&f.cousin, "not yours");
    let mut feed = feed(&f);
    feed.start().await.unwrap();

    f.prompter.answer(true);
    let err = feed.delete(theirs.id).await.unwrap_err();
    assert_eq!(err, ChatError::PermissionDenied);
    assert_eq!(ids(&feed), vec![theirs.id]);
    assert_eq!(f.backend.messages().len(), 1);
    assert_eq!(f.prompter.alerts().len(), 1);
}

#[tokio::test]
async fn text_and_image_are_two_rows_text_first() {
    let f = family().await;
    let mut feed = feed(&f);
    feed.start().await.unwrap();
    f.backend.clear_calls();

    let photo = Attachment::new("diwali.jpg", "image/jpeg", vec![7u8; 64]);
    assert_eq!(feed.send("Happy Diwali", &mut vec![photo]).await.unwrap(), 2);

    let inserts: Vec<Call> = f
        .backend
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Insert { .. }))
        .collect();
    assert_eq!(
        inserts,
        vec![
            Call::Insert {
                text: "Happy Diwali".into(),
                media: false
            },
            Call::Insert {
                text: String::new(),
                media: true
            },
        ]
    );
    let stored = f.backend.messages();
    assert_eq!(stored[0].text, "Happy Diwali");
    assert!(stored[1].has_media());
}

#[tokio::test]
async fn missing_table_stops_fetching() {
    let f = family().await;
    f.backend.set_schema_missing(true);
    let mut feed = feed(&f);

    feed.start().await.unwrap();
    assert_eq!(feed.state(), FeedState::MissingSchema);
    assert!(!feed.is_subscribed());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let selects = f
        .backend
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::SelectMessages))
        .count();
    assert_eq!(selects, 1);
}

#[tokio::test(start_paused = true)]
async fn retry_hint_holds_resend_for_its_duration() {
    let backend = Arc::new(MemoryBackend::new());
    backend.with_account("me@example.com", "pw", "Me");
    let mut flow = AuthFlow::new(backend.clone());

    backend.fail_next_auth("For security purposes, you can only request this after 23 seconds.");
    assert!(flow.resend_confirmation("me@example.com").await.is_err());
    assert_eq!(flow.cooldown().remaining_secs(), 23);
    backend.clear_calls();

    for elapsed in 1..23u64 {
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(flow.cooldown().remaining_secs(), 23 - elapsed);
        let err = flow.resend_confirmation("me@example.com").await.unwrap_err();
        assert_eq!(
            err,
            ChatError::RateLimited {
                retry_after_secs: 23 - elapsed
            }
        );
    }
    assert!(backend.calls().is_empty());

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(flow.cooldown().remaining_secs(), 0);
    flow.resend_confirmation("me@example.com").await.unwrap();
}

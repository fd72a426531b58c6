//! Feed commands. Messages are addressed by the 1-based number shown next
//! to them.

use kinfolk_shared::MessageId;

use crate::feed::{DeleteOutcome, FeedController, FeedState};
use crate::shell::Shell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Text plus any staged attachments.
    Send(String),
    Delete(usize),
    /// Long press: start selecting, or toggle when already selecting.
    Select(usize),
    /// Toggle while selecting.
    Toggle(usize),
    CancelSelection,
    DeleteSelected,
    Refresh,
}

pub(crate) const HELP: &[&str] = &[
    "<text>                 send (with staged attachments)",
    "/attach <path>         stage a photo or video; /detach drops them",
    "/delete <n>            delete your message n",
    "/select <n>            start selecting messages",
    "/toggle <n>            add or remove n while selecting",
    "/delete-selected       delete the selected messages",
    "/cancel                leave selection mode",
    "/refresh               reload the history",
    "/test                  test the backend connection",
    "/logout                sign out",
];

pub(crate) fn parse(name: &str, args: &str) -> Result<ChatCommand, String> {
    let number = || {
        args.parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("Usage: /{name} <message number>"))
    };
    match name {
        "delete" => number().map(ChatCommand::Delete),
        "select" => number().map(ChatCommand::Select),
        "toggle" => number().map(ChatCommand::Toggle),
        "cancel" => Ok(ChatCommand::CancelSelection),
        "delete-selected" => Ok(ChatCommand::DeleteSelected),
        "refresh" => Ok(ChatCommand::Refresh),
        _ => Err(super::unknown(name)),
    }
}

pub(crate) async fn execute(shell: &mut Shell, command: ChatCommand) {
    let Some(mut feed) = shell.feed.take() else {
        return;
    };
    shell.clear_notice();
    match command {
        ChatCommand::Send(text) => {
            // Attachments leave the staging list only once stored.
            let outcome = feed.send(&text, &mut shell.pending).await;
            shell.observe(&outcome);
            if let Ok(rows) = outcome {
                tracing::debug!(rows, "send complete");
            }
        }
        ChatCommand::Delete(n) => match message_id(&feed, n) {
            Some(id) => {
                let outcome = feed.delete(id).await;
                shell.observe(&outcome);
                if let Ok(DeleteOutcome::Deleted(count)) = outcome {
                    tracing::debug!(count, "delete complete");
                }
            }
            None => shell.set_notice(format!("No message {n}.")),
        },
        ChatCommand::Select(n) => match message_id(&feed, n) {
            Some(id) => feed.long_press(id),
            None => shell.set_notice(format!("No message {n}.")),
        },
        ChatCommand::Toggle(n) => match message_id(&feed, n) {
            Some(id) if feed.selection().is_active() => feed.tap(id),
            Some(_) => shell.set_notice("Use /select first."),
            None => shell.set_notice(format!("No message {n}.")),
        },
        ChatCommand::CancelSelection => feed.cancel_selection(),
        ChatCommand::DeleteSelected => {
            let outcome = feed.delete_selected().await;
            shell.observe(&outcome);
        }
        ChatCommand::Refresh => {
            let outcome = if feed.state() == FeedState::MissingSchema {
                feed.start().await
            } else {
                feed.load().await
            };
            shell.observe(&outcome);
            if let Err(e) = outcome {
                shell.set_notice(e.user_message());
            }
        }
    }
    shell.feed = Some(feed);
}

fn message_id(feed: &FeedController, n: usize) -> Option<MessageId> {
    feed.messages().get(n.checked_sub(1)?).map(|m| m.id)
}

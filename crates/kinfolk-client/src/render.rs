//! Plain-text rendering of the current view.

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use kinfolk_shared::{ChatError, MediaKind, Message, Remediation};

use crate::auth::AuthMode;
use crate::feed::{FeedController, FeedState};
use crate::setup;
use crate::shell::{Route, Shell};

/// Messages shown at the bottom of the chat view.
const VISIBLE_MESSAGES: usize = 50;

const OFFLINE_BANNER: &str = "You are currently offline. Some features may not work.";

pub fn render(shell: &Shell) -> String {
    let mut out = String::new();
    match shell.route() {
        Route::ConfigurationMissing => {
            out.push_str("== Connect your backend ==\n");
            out.push_str(setup::configuration_help());
            out.push_str("\nType /setup for the full guide, /reload once configured.\n");
        }
        Route::Loading => out.push_str("Loading...\n"),
        Route::Crashed { message } => {
            out.push_str("== Something went wrong ==\n");
            let _ = writeln!(out, "{message}");
            out.push_str("/reload to start over, /reset to clear local data.\n");
        }
        Route::Auth => render_auth(shell, &mut out),
        Route::Lock => {
            out.push_str("== Family Security Check ==\n");
            let _ = writeln!(
                out,
                "Enter the Family PIN to access {}",
                shell.config().group_name
            );
            out.push_str("(/logout to sign out)\n");
        }
        Route::Chat => render_chat(shell, &mut out),
    }
    if let Some(notice) = shell.notice() {
        let _ = writeln!(out, "\n{notice}");
    }
    out
}

fn render_auth(shell: &Shell, out: &mut String) {
    let Some(auth) = shell.auth() else {
        return;
    };
    match auth.mode() {
        AuthMode::Login => out.push_str("== Welcome back ==\n/login <email> <password>\n"),
        AuthMode::Signup => {
            out.push_str("== Create account ==\n/signup <email> <password> <name>\n");
            match shell.pending().first() {
                Some(photo) => {
                    let _ = writeln!(out, "Profile photo: {}", photo.preview);
                }
                None => out.push_str("Profile photo: generated (stage one with /attach)\n"),
            }
        }
    }
    if let Some(e) = auth.last_error() {
        let _ = writeln!(out, "! {}", e.user_message());
        if let Some(hint) = remediation_hint(e) {
            let _ = writeln!(out, "  {hint}");
        }
    }
    if auth.needs_confirmation() {
        out.push_str("Didn't get the email? /resend <email>\n");
    }
    let cooldown = auth.cooldown().remaining_secs();
    if cooldown > 0 {
        let _ = writeln!(out, "Email actions available in {cooldown}s");
    }
    out.push_str("/mode to switch, /forgot <email>, /test, /help\n");
}

fn remediation_hint(e: &ChatError) -> Option<&'static str> {
    match e.remediation() {
        Remediation::Retry => Some("Try again, or /test the connection."),
        Remediation::SetupGuide => Some("Type /setup for the SQL."),
        Remediation::ResendConfirmation | Remediation::Wait { .. } | Remediation::None => None,
    }
}

fn render_chat(shell: &Shell, out: &mut String) {
    if shell.is_offline() {
        let _ = writeln!(out, "[{OFFLINE_BANNER}]");
    }
    let name = shell
        .group()
        .map(|g| g.settings().name.as_str())
        .unwrap_or(shell.config().group_name.as_str());
    let _ = writeln!(out, "== {name} ==");

    let Some(feed) = shell.feed() else {
        return;
    };
    match feed.state() {
        FeedState::Loading => out.push_str("Loading messages...\n"),
        FeedState::MissingSchema => {
            out.push_str("Database tables are missing.\n");
            out.push_str("Run the SQL from /setup in your backend, then /refresh.\n");
        }
        FeedState::Ready => render_messages(feed, out),
    }

    for attachment in shell.pending() {
        let _ = writeln!(
            out,
            "+ {} ({})",
            attachment.preview,
            format_size(attachment.size() as i64)
        );
    }
    if feed.selection().is_active() {
        let _ = writeln!(
            out,
            "{} selected. /delete-selected or /cancel",
            feed.selection().len()
        );
    }
}

fn render_messages(feed: &FeedController, out: &mut String) {
    let messages = feed.messages();
    if messages.is_empty() {
        out.push_str("No messages yet. Say hello!\n");
        return;
    }
    let me = feed.identity().id;
    let skip = messages.len().saturating_sub(VISIBLE_MESSAGES);
    for (index, message) in messages.iter().enumerate().skip(skip) {
        let marker = if feed.selection().contains(message.id) { '*' } else { ' ' };
        let author = if message.author_id == me {
            "You"
        } else {
            message.author_label()
        };
        let _ = writeln!(
            out,
            "{marker}[{}] {} {author}: {}",
            index + 1,
            format_time(message.created_at),
            body(message)
        );
    }
}

fn body(message: &Message) -> String {
    match (&message.media_url, message.media_kind) {
        (Some(url), kind) => {
            let label = match kind {
                Some(MediaKind::Video) => "video",
                _ => "photo",
            };
            match message.media_size {
                Some(size) => format!("[{label}, {}] {url}", format_size(size)),
                None => format!("[{label}] {url}"),
            }
        }
        (None, _) => message.text.clone(),
    }
}

/// `HH:MM` in local time, or `Sending...` for a row without a timestamp.
pub fn format_time(created_at: Option<DateTime<Utc>>) -> String {
    match created_at {
        Some(at) => at.with_timezone(&Local).format("%H:%M").to_string(),
        None => "Sending...".to_string(),
    }
}

pub fn format_size(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    let bytes = bytes.max(0) as f64;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < KB * KB {
        format!("{:.1} KB", bytes / KB)
    } else {
        format!("{:.1} MB", bytes / (KB * KB))
    }
}

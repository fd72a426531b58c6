pub mod auth;
pub mod commands;
pub mod config;
pub mod cooldown;
pub mod feed;
pub mod files;
pub mod group;
pub mod lock;
pub mod notify;
pub mod prompt;
pub mod render;
pub mod session;
pub mod setup;
pub mod shell;

use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing_subscriber::{fmt, EnvFilter};

use kinfolk_backend::Backend;
use kinfolk_shared::{ChangeEvent, Identity};

use crate::commands::Flow;
use crate::config::AppConfig;
use crate::notify::TerminalNotifier;
use crate::prompt::{InputLines, TerminalPrompter};
use crate::shell::{Route, Shell};

/// Structured logs to stderr, so they stay out of the rendered view.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("kinfolk=debug,kinfolk_client=debug,kinfolk_backend=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

enum Input {
    Line(String),
    Change(Option<ChangeEvent>),
    Session(Option<Identity>),
    Tick,
    Eof,
}

/// Run the terminal client until `/quit` or end of input.
pub async fn run(config: AppConfig, backend: Option<Arc<dyn Backend>>) -> anyhow::Result<()> {
    tracing::info!(configured = backend.is_some(), "starting Kinfolk");

    let (line_tx, line_rx) = mpsc::channel::<String>(64);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });
    let input: InputLines = Arc::new(AsyncMutex::new(line_rx));

    let prompter = Arc::new(TerminalPrompter::new(Arc::clone(&input)));
    let notifier = Arc::new(TerminalNotifier::new(config.notifications));
    let mut shell = Shell::new(config, backend, prompter, notifier);

    let (session_tx, mut session_rx) = mpsc::unbounded_channel();
    let _listener = shell.session_store().map(|store| {
        store.on_change(move |identity| {
            let _ = session_tx.send(identity);
        })
    });

    shell.boot().await;
    draw(&shell)?;

    let mut tick = tokio::time::interval(Duration::from_secs(1));
    let mut cooling = false;
    loop {
        let event = {
            let mut lines = input.lock().await;
            tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => Input::Line(line),
                    None => Input::Eof,
                },
                change = shell.next_change() => Input::Change(change),
                Some(identity) = session_rx.recv() => Input::Session(identity),
                _ = tick.tick() => Input::Tick,
            }
        };

        match event {
            Input::Line(line) => match commands::parse(&shell.route(), &line) {
                Ok(command) => {
                    if shell.dispatch(command).await == Flow::Quit {
                        break;
                    }
                }
                Err(hint) if hint.is_empty() => continue,
                Err(hint) => shell.set_notice(hint),
            },
            Input::Change(Some(event)) => {
                tracing::debug!(msg_id = %event.message_id(), "remote change");
                shell.apply_change(event);
            }
            Input::Change(None) => tracing::warn!("live updates stopped"),
            Input::Session(identity) => shell.on_session_change(identity).await,
            Input::Tick => {
                if !countdown_changed(&shell, &mut cooling) {
                    continue;
                }
            }
            Input::Eof => break,
        }
        draw(&shell)?;
    }

    if let Some(mut feed) = shell.feed.take() {
        feed.stop();
    }
    tracing::info!("bye");
    Ok(())
}

/// A tick redraws while the auth view shows a cooldown, and once more when
/// it runs out so the countdown line disappears.
fn countdown_changed(shell: &Shell, cooling: &mut bool) -> bool {
    let active = shell.route() == Route::Auth
        && shell.auth().is_some_and(|a| a.cooldown().is_active());
    let changed = active || *cooling;
    *cooling = active;
    changed
}

fn draw(shell: &Shell) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    if out.is_terminal() {
        write!(out, "\x1b[2J\x1b[H")?;
    } else {
        writeln!(out)?;
    }
    write!(out, "{}", render::render(shell))?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use kinfolk_backend::MemoryBackend;

    use crate::notify::RecordingNotifier;
    use crate::prompt::ScriptedPrompter;

    fn countdown_line(shell: &Shell) -> Option<String> {
        render::render(shell)
            .lines()
            .find(|l| l.starts_with("Email actions available in"))
            .map(str::to_string)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_redraw_a_falling_countdown() {
        let backend = Arc::new(MemoryBackend::new());
        backend.with_account("mum@example.com", "pw", "Mum");
        let mut shell = Shell::new(
            AppConfig::default(),
            Some(backend.clone() as Arc<dyn Backend>),
            Arc::new(ScriptedPrompter::default()),
            Arc::new(RecordingNotifier::default()),
        );
        shell.boot().await;
        let mut cooling = false;
        assert!(!countdown_changed(&shell, &mut cooling));

        backend.fail_next_auth("For security purposes, you can only request this after 3 seconds.");
        let resend = commands::parse(&shell.route(), "/resend mum@example.com").unwrap();
        shell.dispatch(resend).await;

        let mut shown = Vec::new();
        for _ in 0..3 {
            assert!(countdown_changed(&shell, &mut cooling));
            shown.extend(countdown_line(&shell));
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert_eq!(
            shown,
            [
                "Email actions available in 3s",
                "Email actions available in 2s",
                "Email actions available in 1s",
            ]
        );

        // One last redraw clears the line, then ticks go quiet.
        assert!(countdown_changed(&shell, &mut cooling));
        assert_eq!(countdown_line(&shell), None);
        assert!(!countdown_changed(&shell, &mut cooling));
    }
}

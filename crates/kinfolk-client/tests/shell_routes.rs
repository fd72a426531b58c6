//! Driving the shell through typed commands.

use std::sync::Arc;

use async_trait::async_trait;

use kinfolk_backend::memory::Call;
use kinfolk_backend::{AuthApi, Backend, MemoryBackend};
use kinfolk_client::commands::{self, ChatCommand, Command, Flow};
use kinfolk_client::config::AppConfig;
use kinfolk_client::notify::RecordingNotifier;
use kinfolk_client::prompt::{Prompter, ScriptedPrompter};
use kinfolk_client::render::render;
use kinfolk_client::shell::{Route, Shell};

fn shell(backend: &Arc<MemoryBackend>, prompter: Arc<dyn Prompter>) -> Shell {
    Shell::new(
        AppConfig::default(),
        Some(backend.clone() as Arc<dyn Backend>),
        prompter,
        Arc::new(RecordingNotifier::default()),
    )
}

async fn type_line(shell: &mut Shell, line: &str) -> Flow {
    let command = commands::parse(&shell.route(), line).expect("valid command");
    shell.dispatch(command).await
}

#[tokio::test]
async fn login_chat_hide_unlock_logout() {
    let backend = Arc::new(MemoryBackend::new());
    backend.with_account("mum@example.com", "pw", "Mum");
    let mut shell = shell(&backend, Arc::new(ScriptedPrompter::default()));
    shell.boot().await;
    assert_eq!(shell.route(), Route::Auth);

    type_line(&mut shell, "/login mum@example.com wrong").await;
    assert_eq!(shell.route(), Route::Auth);
    assert!(render(&shell).contains("Invalid email or password"));

    type_line(&mut shell, "/login mum@example.com pw").await;
    assert_eq!(shell.route(), Route::Chat);

    type_line(&mut shell, "Khana ready hai").await;
    assert_eq!(backend.messages().len(), 1);
    assert!(render(&shell).contains("[1]"));

    type_line(&mut shell, "/hide").await;
    assert_eq!(shell.route(), Route::Lock);
    type_line(&mut shell, "KKG").await;
    assert_eq!(shell.route(), Route::Chat);
    assert_eq!(shell.feed().map(|f| f.messages().len()), Some(1));

    type_line(&mut shell, "/logout").await;
    assert_eq!(shell.route(), Route::Auth);
    assert!(backend.calls().contains(&Call::SignOut));
    assert_eq!(type_line(&mut shell, "/quit").await, Flow::Quit);
}

#[tokio::test]
async fn signup_with_staged_photo() {
    let dir = tempfile::tempdir().unwrap();
    let photo = dir.path().join("nani.png");
    std::fs::write(&photo, [1u8, 2, 3]).unwrap();

    let backend = Arc::new(MemoryBackend::new());
    let mut shell = shell(&backend, Arc::new(ScriptedPrompter::default()));
    shell.boot().await;

    type_line(&mut shell, "/mode").await;
    type_line(&mut shell, &format!("/attach {}", photo.display())).await;
    assert!(render(&shell).contains("local:nani.png"));

    type_line(&mut shell, "/signup nani@example.com pw Nani Ma").await;
    assert_eq!(shell.route(), Route::Chat);
    assert!(backend.object_paths()[0].starts_with("profile_"));
    assert_eq!(backend.profiles()[0].display_name, "Nani Ma");
    assert!(shell.pending().is_empty());
}

#[tokio::test]
async fn restored_session_needs_the_pin() {
    let backend = Arc::new(MemoryBackend::new());
    backend.with_account("mum@example.com", "pw", "Mum");
    backend.sign_in("mum@example.com", "pw").await.unwrap();

    let mut shell = shell(&backend, Arc::new(ScriptedPrompter::default()));
    shell.boot().await;
    assert_eq!(shell.route(), Route::Lock);

    type_line(&mut shell, "1234").await;
    assert_eq!(shell.route(), Route::Lock);
    assert!(render(&shell).contains("Incorrect PIN"));

    type_line(&mut shell, "/pin KKG").await;
    assert_eq!(shell.route(), Route::Chat);
}

#[tokio::test]
async fn missing_configuration_shows_setup() {
    let mut shell = Shell::new(
        AppConfig::default(),
        None,
        Arc::new(ScriptedPrompter::default()),
        Arc::new(RecordingNotifier::default()),
    );
    shell.boot().await;
    assert_eq!(shell.route(), Route::ConfigurationMissing);
    assert!(render(&shell).contains("KINFOLK_BACKEND_URL"));

    type_line(&mut shell, "/setup").await;
    assert!(render(&shell).contains("create table public.messages"));
}

fn texts(backend: &MemoryBackend) -> Vec<String> {
    backend.messages().into_iter().map(|m| m.text).collect()
}

#[tokio::test]
async fn delete_by_number_confirms_the_resolved_message() {
    let backend = Arc::new(MemoryBackend::new());
    let mum = backend.with_account("mum@example.com", "pw", "Mum");
    let chacha = backend.with_account("chacha@example.com", "pw", "Chacha");
    let theirs = backend.seed_message(&chacha, "theirs");
    backend.seed_message(&mum, "keep me");
    backend.seed_message(&mum, "delete me");
    let prompter = Arc::new(ScriptedPrompter::default());
    let mut shell = shell(&backend, prompter.clone());
    shell.boot().await;
    type_line(&mut shell, "/login mum@example.com pw").await;

    // Row 1 disappears between the redraw and the command, shifting the
    // numbers under the user.
    backend.push_remote_delete(theirs.id);
    let event = shell.next_change().await.expect("change feed open");
    shell.apply_change(event);

    type_line(&mut shell, "/delete 2").await;
    assert_eq!(
        prompter.questions(),
        vec!["Delete your message \"delete me\"?".to_string()]
    );
    assert_eq!(texts(&backend), ["keep me", "delete me"]);

    prompter.answer(true);
    type_line(&mut shell, "/delete 1").await;
    assert_eq!(prompter.questions()[1], "Delete your message \"keep me\"?");
    assert_eq!(texts(&backend), ["delete me"]);
}

#[tokio::test]
async fn failed_send_keeps_staged_attachments() {
    let dir = tempfile::tempdir().unwrap();
    let mut lines = Vec::new();
    for name in ["one.png", "two.png"] {
        let path = dir.path().join(name);
        std::fs::write(&path, [9u8; 16]).unwrap();
        lines.push(format!("/attach {}", path.display()));
    }

    let backend = Arc::new(MemoryBackend::new());
    backend.with_account("mum@example.com", "pw", "Mum");
    let mut shell = shell(&backend, Arc::new(ScriptedPrompter::default()));
    shell.boot().await;
    type_line(&mut shell, "/login mum@example.com pw").await;
    for line in &lines {
        type_line(&mut shell, line).await;
    }
    assert_eq!(shell.pending().len(), 2);

    backend.set_fail_uploads(true);
    shell
        .dispatch(Command::Chat(ChatCommand::Send(String::new())))
        .await;
    assert!(backend.messages().is_empty());
    assert_eq!(shell.pending().len(), 2);

    backend.set_fail_uploads(false);
    shell
        .dispatch(Command::Chat(ChatCommand::Send(String::new())))
        .await;
    assert_eq!(backend.messages().len(), 2);
    assert!(shell.pending().is_empty());
}

struct PanickingPrompter;

#[async_trait]
impl Prompter for PanickingPrompter {
    async fn confirm(&self, _question: &str) -> bool {
        panic!("prompt exploded")
    }

    async fn alert(&self, _message: &str) {}
}

#[tokio::test]
async fn panicking_handler_crashes_then_reload_and_reset_recover() {
    let backend = Arc::new(MemoryBackend::new());
    let mum = backend.with_account("mum@example.com", "pw", "Mum");
    backend.seed_message(&mum, "hello");
    let mut shell = shell(&backend, Arc::new(PanickingPrompter));
    shell.boot().await;
    type_line(&mut shell, "/login mum@example.com pw").await;

    type_line(&mut shell, "/delete 1").await;
    assert_eq!(
        shell.route(),
        Route::Crashed {
            message: "prompt exploded".into()
        }
    );
    assert!(render(&shell).contains("/reset"));

    type_line(&mut shell, "/reload").await;
    assert_eq!(shell.route(), Route::Lock);

    type_line(&mut shell, "/reset").await;
    assert_eq!(shell.route(), Route::Auth);
    assert!(backend.calls().contains(&Call::ClearLocalState));
    assert_eq!(backend.messages().len(), 1);
}

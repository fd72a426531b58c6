//! Blocking confirmations and alerts.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask a yes/no question. Anything but an explicit yes is a no.
    async fn confirm(&self, question: &str) -> bool;

    /// Show a message the user must acknowledge.
    async fn alert(&self, message: &str);
}

/// Shared line source: the terminal reader task feeds it, the event loop and
/// the prompter both draw from it.
pub type InputLines = Arc<AsyncMutex<mpsc::Receiver<String>>>;

pub struct TerminalPrompter {
    input: InputLines,
}

impl TerminalPrompter {
    pub fn new(input: InputLines) -> Self {
        Self { input }
    }

    fn print(text: &str) {
        let mut out = std::io::stdout().lock();
        // Nothing sensible to do when stdout is gone.
        let _ = write!(out, "{text}");
        let _ = out.flush();
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn confirm(&self, question: &str) -> bool {
        Self::print(&format!("{question} [y/N] "));
        let answer = self.input.lock().await.recv().await;
        matches!(
            answer.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
            Some("y") | Some("yes")
        )
    }

    async fn alert(&self, message: &str) {
        Self::print(&format!("!! {message}\n"));
    }
}

/// Answers confirmations from a queue and records alerts.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<bool>>,
    questions: Mutex<Vec<String>>,
    alerts: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    /// Queue the answer for the next confirmation. An empty queue answers no.
    pub fn answer(&self, yes: bool) {
        if let Ok(mut answers) = self.answers.lock() {
            answers.push_back(yes);
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, question: &str) -> bool {
        if let Ok(mut questions) = self.questions.lock() {
            questions.push(question.to_string());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or(false)
    }

    async fn alert(&self, message: &str) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(message.to_string());
        }
    }
}

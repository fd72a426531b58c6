//! Desktop notification and audible chime for incoming messages.

use std::io::Write;
use std::sync::Mutex;

/// Notification sink. Failures are reported but never fatal to the caller.
pub trait Notifier: Send + Sync {
    /// Ask for permission to notify. Returns whether notifications are allowed.
    fn request_permission(&self) -> bool;

    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()>;

    fn chime(&self) -> anyhow::Result<()>;
}

/// Prints a notice line and rings the terminal bell.
pub struct TerminalNotifier {
    enabled: bool,
}

impl TerminalNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notifier for TerminalNotifier {
    fn request_permission(&self) -> bool {
        self.enabled
    }

    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut out = std::io::stdout().lock();
        writeln!(out, "** {title}: {body}")?;
        out.flush()?;
        Ok(())
    }

    fn chime(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut out = std::io::stdout().lock();
        out.write_all(b"\x07")?;
        out.flush()?;
        Ok(())
    }
}

/// Keeps every notification in memory; used by tests and headless runs.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(String, String)>>,
    chimes: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<(String, String)> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn chimes(&self) -> usize {
        self.chimes.lock().map(|c| *c).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn request_permission(&self) -> bool {
        true
    }

    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()> {
        self.notices
            .lock()
            .map_err(|e| anyhow::anyhow!("notifier lock poisoned: {e}"))?
            .push((title.to_string(), body.to_string()));
        Ok(())
    }

    fn chime(&self) -> anyhow::Result<()> {
        *self
            .chimes
            .lock()
            .map_err(|e| anyhow::anyhow!("notifier lock poisoned: {e}"))? += 1;
        Ok(())
    }
}

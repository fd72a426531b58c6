use std::time::Duration;

use tokio::time::Instant;

/// Whole-second countdown gating a rate-limited action.
#[derive(Debug, Clone, Default)]
pub struct Cooldown {
    until: Option<Instant>,
}

impl Cooldown {
    pub fn start(&mut self, seconds: u64) {
        tracing::debug!(seconds, "cooldown started");
        self.until = Some(Instant::now() + Duration::from_secs(seconds));
    }

    /// Seconds left, rounded up. Reaches 0 exactly when the countdown ends.
    pub fn remaining_secs(&self) -> u64 {
        let Some(until) = self.until else {
            return 0;
        };
        let left = until.saturating_duration_since(Instant::now());
        let secs = left.as_secs();
        if left.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    pub fn is_active(&self) -> bool {
        self.remaining_secs() > 0
    }

    pub fn reset(&mut self) {
        self.until = None;
    }
}

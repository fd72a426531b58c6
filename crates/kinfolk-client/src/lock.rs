//! Family PIN gate in front of the chat.
//!
//! A shared placeholder secret, not access control: it only keeps a
//! casually unattended screen from showing the conversation.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Incorrect PIN")]
    IncorrectPin,
}

/// Whether the app window is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone)]
pub struct LockGate {
    pin: String,
    unlocked: bool,
}

impl LockGate {
    pub fn new(pin: impl Into<String>) -> Self {
        Self {
            pin: pin.into(),
            unlocked: false,
        }
    }

    pub fn try_unlock(&mut self, entered: &str) -> Result<(), LockError> {
        if entered == self.pin {
            self.unlock();
            Ok(())
        } else {
            tracing::info!("lock gate rejected PIN");
            Err(LockError::IncorrectPin)
        }
    }

    /// Unlock without a PIN (a successful password login).
    pub fn unlock(&mut self) {
        self.unlocked = true;
    }

    pub fn lock(&mut self) {
        if self.unlocked {
            tracing::debug!("lock gate engaged");
        }
        self.unlocked = false;
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn on_visibility(&mut self, visibility: Visibility) {
        if visibility == Visibility::Hidden {
            self.lock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_check() {
        let mut gate = LockGate::new("KKG");
        assert_eq!(gate.try_unlock("kkg"), Err(LockError::IncorrectPin));
        assert!(!gate.is_unlocked());
        gate.try_unlock("KKG").unwrap();
        assert!(gate.is_unlocked());
    }

    #[test]
    fn test_hidden_relocks() {
        let mut gate = LockGate::new("KKG");
        gate.unlock();
        gate.on_visibility(Visibility::Visible);
        assert!(gate.is_unlocked());
        gate.on_visibility(Visibility::Hidden);
        assert!(!gate.is_unlocked());
    }
}

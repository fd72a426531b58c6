use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::constants::DEFAULT_COOLDOWN_SECS;

/// User-facing error taxonomy.
///
/// Backend-specific failures are folded into these variants so the views
/// can pick a human-readable message and a remediation affordance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Network unreachable")]
    NetworkUnreachable,

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Email not confirmed")]
    EmailUnconfirmed,

    #[error("Message table does not exist")]
    SchemaMissing,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Rejected locally before any request was made.
    #[error("{0}")]
    InvalidInput(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

/// What the view should offer next to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    Retry,
    ResendConfirmation,
    SetupGuide,
    Wait { seconds: u64 },
    None,
}

impl ChatError {
    /// Classify a raw backend error message by its known patterns.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if let Some(seconds) = parse_retry_after(message) {
            Self::RateLimited {
                retry_after_secs: seconds,
            }
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            Self::RateLimited {
                retry_after_secs: DEFAULT_COOLDOWN_SECS,
            }
        } else if lower.contains("email not confirmed") {
            Self::EmailUnconfirmed
        } else if lower.contains("invalid login credentials") {
            Self::InvalidCredentials
        } else if lower.contains("failed to fetch") || lower.contains("network") {
            Self::NetworkUnreachable
        } else {
            Self::Unknown(message.to_string())
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::NetworkUnreachable => {
                "Network error. Could not connect to the server.".to_string()
            }
            Self::InvalidCredentials => "Invalid email or password. Please try again.".to_string(),
            Self::RateLimited { retry_after_secs } => {
                format!("Too many requests. Please wait {retry_after_secs} seconds.")
            }
            Self::EmailUnconfirmed => "Email confirmation is ON. Please check your inbox for \
                 the confirmation link, or resend it."
                .to_string(),
            Self::SchemaMissing => "Database tables are missing! Run the SQL from the setup \
                 guide to create them."
                .to_string(),
            Self::PermissionDenied => {
                "Permission denied. You can only delete your own messages.".to_string()
            }
            Self::UploadFailed(reason) => format!("Failed to upload file: {reason}"),
            Self::InvalidInput(reason) => reason.clone(),
            Self::Unknown(_) => "Something went wrong. Please try again.".to_string(),
        }
    }

    pub fn remediation(&self) -> Remediation {
        match self {
            Self::NetworkUnreachable | Self::Unknown(_) | Self::UploadFailed(_) => {
                Remediation::Retry
            }
            Self::EmailUnconfirmed => Remediation::ResendConfirmation,
            Self::SchemaMissing => Remediation::SetupGuide,
            Self::RateLimited { retry_after_secs } => Remediation::Wait {
                seconds: *retry_after_secs,
            },
            Self::InvalidCredentials | Self::PermissionDenied | Self::InvalidInput(_) => {
                Remediation::None
            }
        }
    }
}

/// Extract the cooldown from messages like
/// "For security purposes, you can only request this after 23 seconds."
pub fn parse_retry_after(message: &str) -> Option<u64> {
    static RETRY_RE: OnceLock<Regex> = OnceLock::new();
    let re = RETRY_RE.get_or_init(|| {
        Regex::new(r"after (\d+) seconds").expect("valid retry-after regex")
    });
    re.captures(message)?.get(1)?.as_str().parse().ok()
}

/// Convenience alias used by the application layer.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            parse_retry_after(
                "For security purposes, you can only request this after 23 seconds."
            ),
            Some(23)
        );
        assert_eq!(parse_retry_after("email rate limit exceeded"), None);
    }

    #[test]
    fn test_classify_known_patterns() {
        assert_eq!(
            ChatError::from_message("Invalid login credentials"),
            ChatError::InvalidCredentials
        );
        assert_eq!(
            ChatError::from_message("Email not confirmed"),
            ChatError::EmailUnconfirmed
        );
        assert_eq!(
            ChatError::from_message("email rate limit exceeded"),
            ChatError::RateLimited {
                retry_after_secs: DEFAULT_COOLDOWN_SECS
            }
        );
        assert_eq!(
            ChatError::from_message("you can only request this after 7 seconds"),
            ChatError::RateLimited {
                retry_after_secs: 7
            }
        );
        assert!(matches!(
            ChatError::from_message("relation is weird"),
            ChatError::Unknown(_)
        ));
    }

    #[test]
    fn test_unknown_errors_get_generic_message() {
        let err = ChatError::Unknown("pg: deadlock detected".into());
        assert_eq!(err.user_message(), "Something went wrong. Please try again.");
        assert_eq!(err.remediation(), Remediation::Retry);
    }

    #[test]
    fn test_remediation_for_schema_and_confirmation() {
        assert_eq!(ChatError::SchemaMissing.remediation(), Remediation::SetupGuide);
        assert_eq!(
            ChatError::EmailUnconfirmed.remediation(),
            Remediation::ResendConfirmation
        );
        assert_eq!(
            ChatError::RateLimited {
                retry_after_secs: 9
            }
            .remediation(),
            Remediation::Wait { seconds: 9 }
        );
    }
}

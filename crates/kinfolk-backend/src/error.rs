use kinfolk_shared::constants::{
    INSUFFICIENT_PRIVILEGE_CODE, SCHEMA_CACHE_MISS_CODE, UNDEFINED_TABLE_CODE,
};
use kinfolk_shared::ChatError;
use thiserror::Error;

/// Errors produced by the backend layer.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service could not be reached at all.
    #[error("Service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with an error body.
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Realtime socket failure.
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// A representation was requested but the service returned no row.
    #[error("Service returned no rows")]
    EmptyResponse,

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Could not determine application data directory")]
    NoDataDir,
}

impl BackendError {
    /// Build an [`BackendError::Api`] from a status and a JSON error body.
    ///
    /// The auth, data and storage services all use slightly different
    /// shapes; the first message-like field wins.
    pub fn from_body(status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let message = field("msg")
            .or_else(|| field("message"))
            .or_else(|| field("error_description"))
            .or_else(|| field("error"))
            .unwrap_or_else(|| body.trim().to_string());
        let code = field("code").or_else(|| field("error_code"));

        Self::Api {
            status,
            code,
            message,
        }
    }

    pub fn is_schema_missing(&self) -> bool {
        matches!(
            self,
            Self::Api { code: Some(code), .. }
                if code == UNDEFINED_TABLE_CODE || code == SCHEMA_CACHE_MISS_CODE
        )
    }
}

impl From<BackendError> for ChatError {
    fn from(err: BackendError) -> Self {
        if err.is_schema_missing() {
            return ChatError::SchemaMissing;
        }
        match err {
            BackendError::Http(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
                ChatError::NetworkUnreachable
            }
            BackendError::Http(e) => ChatError::Unknown(e.to_string()),
            BackendError::Unreachable(_) => ChatError::NetworkUnreachable,
            BackendError::Api {
                status,
                code,
                message,
            } => {
                if code.as_deref() == Some(INSUFFICIENT_PRIVILEGE_CODE) {
                    return ChatError::PermissionDenied;
                }
                match ChatError::from_message(&message) {
                    ChatError::Unknown(_) if status == 429 => ChatError::RateLimited {
                        retry_after_secs: kinfolk_shared::constants::DEFAULT_COOLDOWN_SECS,
                    },
                    ChatError::Unknown(_) if status == 401 || status == 403 => {
                        ChatError::PermissionDenied
                    }
                    classified => classified,
                }
            }
            BackendError::NotSignedIn => ChatError::PermissionDenied,
            other => ChatError::Unknown(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BackendError>;

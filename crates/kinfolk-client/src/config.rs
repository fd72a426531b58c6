//! Client configuration loaded from environment variables.
//!
//! Everything except the backend project has a default. A `.env` file in
//! the working directory is loaded first by the binary.

use std::path::PathBuf;

use kinfolk_backend::BackendConfig;
use kinfolk_shared::constants::{DEFAULT_GROUP_NAME, DEFAULT_LOCK_PIN, DEFAULT_MEDIA_BUCKET};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Hosted backend endpoint.
    /// Env: `KINFOLK_BACKEND_URL`
    /// Default: none (the shell shows the configuration screen).
    pub backend_url: Option<String>,

    /// Public (anon) API key of the backend project.
    /// Env: `KINFOLK_PUBLIC_KEY`
    pub public_key: Option<String>,

    /// Shared family PIN for the lock gate.
    /// Env: `KINFOLK_LOCK_PIN`
    /// Default: `KKG`
    pub lock_pin: String,

    /// Env: `KINFOLK_MEDIA_BUCKET`
    /// Default: `chat-media`
    pub media_bucket: String,

    /// Group name shown until the settings row says otherwise.
    /// Env: `KINFOLK_GROUP_NAME`
    /// Default: `GUPTA FAMILY`
    pub group_name: String,

    /// Where the session file is kept.
    /// Env: `KINFOLK_DATA_DIR`
    /// Default: platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Desktop notifications and chime for messages from others.
    /// Env: `KINFOLK_NOTIFICATIONS` (true/false)
    /// Default: `true`
    pub notifications: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            public_key: None,
            lock_pin: DEFAULT_LOCK_PIN.to_string(),
            media_bucket: DEFAULT_MEDIA_BUCKET.to_string(),
            group_name: DEFAULT_GROUP_NAME.to_string(),
            data_dir: None,
            notifications: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = get("KINFOLK_BACKEND_URL") {
            if url.starts_with("https://") || url.starts_with("http://") {
                config.backend_url = Some(url);
            } else {
                tracing::warn!(value = %url, "Invalid KINFOLK_BACKEND_URL, expected an http(s) URL");
            }
        }

        config.public_key = get("KINFOLK_PUBLIC_KEY");

        if let Some(pin) = get("KINFOLK_LOCK_PIN") {
            config.lock_pin = pin;
        }

        if let Some(bucket) = get("KINFOLK_MEDIA_BUCKET") {
            config.media_bucket = bucket;
        }

        if let Some(name) = get("KINFOLK_GROUP_NAME") {
            config.group_name = name;
        }

        if let Some(dir) = get("KINFOLK_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(val) = get("KINFOLK_NOTIFICATIONS") {
            match parse_flag(&val) {
                Some(flag) => config.notifications = flag,
                None => tracing::warn!(value = %val, "Invalid KINFOLK_NOTIFICATIONS, using default"),
            }
        }

        config
    }

    /// Backend selection, or `None` when the project is not configured.
    pub fn backend_config(&self) -> Option<BackendConfig> {
        Some(BackendConfig {
            url: self.backend_url.clone()?,
            public_key: self.public_key.clone()?,
            media_bucket: self.media_bucket.clone(),
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

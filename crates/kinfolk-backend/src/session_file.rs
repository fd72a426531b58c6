//! Persisted session token pair.
//!
//! The file lives in the platform data directory:
//! - Linux:   `~/.local/share/kinfolk/session.json`
//! - macOS:   `~/Library/Application Support/com.kinfolk.kinfolk/session.json`
//! - Windows: `{FOLDERID_RoamingAppData}\kinfolk\kinfolk\data\session.json`

use std::path::{Path, PathBuf};

use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use kinfolk_shared::constants::SESSION_REFRESH_MARGIN_SECS;
use kinfolk_shared::Identity;

use crate::error::{BackendError, Result};

const SESSION_FILE_NAME: &str = "session.json";

/// Token pair plus the identity it was issued for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user: Identity,
}

impl StoredSession {
    /// True when the access token expires within the refresh margin.
    pub fn needs_refresh(&self) -> bool {
        self.expires_at - Utc::now().timestamp() <= SESSION_REFRESH_MARGIN_SECS
    }
}

#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    /// Session file in the default application data directory.
    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "kinfolk", "kinfolk").ok_or(BackendError::NoDataDir)?;
        Ok(Self::in_dir(dirs.data_dir()))
    }

    /// Session file inside an explicit directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(SESSION_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored session. A missing file is not an error; a corrupt
    /// one is discarded with a warning.
    pub async fn load(&self) -> Result<Option<StoredSession>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "discarding unreadable session file");
                self.clear().await?;
                Ok(None)
            }
        }
    }

    /// Write the session atomically (temp file + rename).
    pub async fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(session)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "session file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinfolk_shared::UserId;

    fn session(expires_at: i64) -> StoredSession {
        StoredSession {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at,
            user: Identity {
                id: UserId::new(),
                email: Some("mum@example.com".into()),
                display_name: Some("Mum".into()),
                photo_url: None,
            },
        }
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::in_dir(&dir.path().join("nested"));

        assert_eq!(file.load().await.unwrap(), None);

        let stored = session(Utc::now().timestamp() + 3600);
        file.save(&stored).await.unwrap();
        assert_eq!(file.load().await.unwrap(), Some(stored));

        file.clear().await.unwrap();
        assert!(!file.path().exists());
        // Clearing twice is fine.
        file.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::in_dir(dir.path());
        tokio::fs::write(file.path(), b"{not json").await.unwrap();

        assert_eq!(file.load().await.unwrap(), None);
        assert!(!file.path().exists());
    }

    #[test]
    fn test_needs_refresh_margin() {
        let now = Utc::now().timestamp();
        assert!(session(now + 30).needs_refresh());
        assert!(session(now - 10).needs_refresh());
        assert!(!session(now + 3600).needs_refresh());
    }
}

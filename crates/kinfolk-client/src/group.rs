//! Group and profile panel.
//!
//! Participants are derived from the feed itself: anybody who has posted
//! shows up with the name and photo of their newest message. Group name and
//! icon edits only live in this panel.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use kinfolk_backend::Backend;
use kinfolk_shared::error::Result;
use kinfolk_shared::{Attachment, ChatError, GroupSettings, Identity, Participant, ProfileMetadata};

pub struct GroupPanel {
    backend: Arc<dyn Backend>,
    identity: Identity,
    settings: GroupSettings,
    participants: Vec<Participant>,
}

impl GroupPanel {
    pub fn new(backend: Arc<dyn Backend>, identity: Identity, group_name: &str) -> Self {
        Self {
            backend,
            identity,
            settings: GroupSettings::named(group_name),
            participants: Vec::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn settings(&self) -> &GroupSettings {
        &self.settings
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Re-derive the participant list from the message table.
    pub async fn refresh_participants(&mut self) -> Result<&[Participant]> {
        let authors = self.backend.select_authors().await?;
        self.participants = distinct_participants(authors);
        tracing::debug!(count = self.participants.len(), "participants refreshed");
        Ok(&self.participants)
    }

    /// Pick up a shared group name/icon if the settings row exists.
    pub async fn load_group_settings(&mut self) -> &GroupSettings {
        match self.backend.fetch_group_settings().await {
            Ok(Some(settings)) => self.settings = settings,
            Ok(None) => tracing::debug!("no shared group settings"),
            Err(e) => tracing::debug!(error = %e, "group settings unavailable, keeping defaults"),
        }
        &self.settings
    }

    /// Change the display name on the identity. Existing messages keep the
    /// name they were sent with. Blank names are ignored.
    pub async fn update_display_name(&mut self, name: &str) -> Result<Option<Identity>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        let metadata = ProfileMetadata {
            display_name: Some(name.to_string()),
            photo_url: None,
        };
        let identity = self.backend.update_profile_metadata(&metadata).await?;
        tracing::info!(user = %identity.id, "display name updated");
        self.identity = identity.clone();
        Ok(Some(identity))
    }

    pub async fn update_photo(&mut self, file: &Attachment) -> Result<Identity> {
        let path = format!(
            "profile_{}_{}.{}",
            self.identity.id,
            Utc::now().timestamp_millis(),
            file.extension()
        );
        let url = self.upload(&path, file).await?;
        let metadata = ProfileMetadata {
            display_name: None,
            photo_url: Some(url),
        };
        let identity = self.backend.update_profile_metadata(&metadata).await?;
        tracing::info!(user = %identity.id, "profile photo updated");
        self.identity = identity.clone();
        Ok(identity)
    }

    /// Rename the group locally. Returns false for a blank name.
    pub fn rename_group(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.settings.name = name.to_string();
        true
    }

    /// Upload a new group icon and keep its URL locally.
    pub async fn update_group_icon(&mut self, file: &Attachment) -> Result<String> {
        let path = format!(
            "group_icon_{}.{}",
            Utc::now().timestamp_millis(),
            file.extension()
        );
        let url = self.upload(&path, file).await?;
        self.settings.icon_url = url.clone();
        Ok(url)
    }

    async fn upload(&self, path: &str, file: &Attachment) -> Result<String> {
        self.backend
            .upload(path, &file.content_type, file.bytes.clone())
            .await
            .map_err(|e| ChatError::UploadFailed(ChatError::from(e).to_string()))?;
        Ok(self.backend.public_url(path))
    }
}

/// First occurrence per author wins; input is newest first.
fn distinct_participants(authors: Vec<Participant>) -> Vec<Participant> {
    let mut seen = HashSet::new();
    authors
        .into_iter()
        .filter(|p| seen.insert(p.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinfolk_backend::memory::Call;
    use kinfolk_backend::{AuthApi, MemoryBackend};

    async fn panel() -> (Arc<MemoryBackend>, GroupPanel, Identity) {
        let backend = Arc::new(MemoryBackend::new());
        let me = backend.with_account("me@example.com", "pw", "Me");
        backend.sign_in("me@example.com", "pw").await.unwrap();
        let panel = GroupPanel::new(backend.clone(), me.clone(), "GUPTA FAMILY");
        (backend, panel, me)
    }

    #[tokio::test]
    async fn test_newest_snapshot_wins() {
        let (backend, mut panel, me) = panel().await;
        let dad = backend.with_account("dad@example.com", "pw", "Dad");
        backend.seed_message(&me, "old name");
        backend.seed_message(&dad, "hi");
        let renamed = Identity {
            display_name: Some("Me Again".into()),
            ..me.clone()
        };
        backend.seed_message(&renamed, "new name");

        let participants = panel.refresh_participants().await.unwrap();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].display_name, "Me Again");
        assert_eq!(participants[1].display_name, "Dad");
    }

    #[tokio::test]
    async fn test_blank_display_name_is_ignored() {
        let (backend, mut panel, _) = panel().await;
        backend.clear_calls();
        assert_eq!(panel.update_display_name("  ").await.unwrap(), None);
        assert!(backend.calls().is_empty());

        let updated = panel.update_display_name("Chhotu").await.unwrap().unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Chhotu"));
        assert_eq!(panel.identity().display_name.as_deref(), Some("Chhotu"));
    }

    #[tokio::test]
    async fn test_update_photo_path_and_metadata() {
        let (backend, mut panel, me) = panel().await;
        let photo = Attachment::new("face.webp", "image/webp", vec![1, 2, 3]);
        let identity = panel.update_photo(&photo).await.unwrap();

        let paths = backend.object_paths();
        assert!(paths[0].starts_with(&format!("profile_{}_", me.id)));
        assert!(paths[0].ends_with(".webp"));
        assert!(identity.photo_url.unwrap().ends_with(&paths[0]));
        assert_eq!(backend.current_identity().unwrap().display_name.as_deref(), Some("Me"));
    }

    #[tokio::test]
    async fn test_group_edits_stay_local() {
        let (backend, mut panel, _) = panel().await;
        assert!(!panel.rename_group(" "));
        assert!(panel.rename_group("Sharma Parivar"));
        assert_eq!(panel.settings().name, "Sharma Parivar");

        let icon = Attachment::new("icon.png", "image/png", vec![9]);
        let url = panel.update_group_icon(&icon).await.unwrap();
        assert_eq!(panel.settings().icon_url, url);
        assert!(backend.object_paths()[0].starts_with("group_icon_"));
        assert!(backend
            .calls()
            .iter()
            .all(|c| matches!(c, Call::SignIn { .. } | Call::Upload { .. })));
    }

    #[tokio::test]
    async fn test_group_settings_fall_back_to_defaults() {
        let (backend, mut panel, _) = panel().await;
        assert_eq!(panel.load_group_settings().await.name, "GUPTA FAMILY");

        backend.set_group_settings(GroupSettings::named("Nanighar"));
        assert_eq!(panel.load_group_settings().await.name, "Nanighar");

        backend.set_unreachable(true);
        assert_eq!(panel.load_group_settings().await.name, "Nanighar");
    }
}

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;
use uuid::Uuid;

use crate::constants::{AVATAR_SERVICE_URL, DEFAULT_GROUP_NAME, UNKNOWN_AUTHOR};

// User identity = auth service UUID
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by declared content type: `video/*` is a video, anything
    /// else uploaded as an attachment is shown as an image.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video/") {
            Self::Video
        } else {
            Self::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The authenticated user as reported by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl Identity {
    /// Name stamped on outgoing messages.
    pub fn display_name_or_unknown(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(UNKNOWN_AUTHOR)
    }
}

/// Mutable identity metadata (`user_metadata` on the auth service).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Row written to the `users` table at signup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileRow {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub photo_url: String,
}

/// Avatar URL generated from a display name, used when no photo exists.
pub fn generated_avatar_url(name: &str) -> String {
    avatar_url_with(name, &[("background", "random")])
}

fn avatar_url_with(name: &str, extra: &[(&str, &str)]) -> String {
    let mut params = vec![("name", name)];
    params.extend_from_slice(extra);
    match Url::parse_with_params(AVATAR_SERVICE_URL, params) {
        Ok(url) => url.to_string(),
        Err(_) => AVATAR_SERVICE_URL.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A row of the shared message feed, as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text: String,
    #[serde(rename = "uid")]
    pub author_id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub photo_url: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub media_url: Option<String>,
    #[serde(default, rename = "media_type")]
    pub media_kind: Option<MediaKind>,
    #[serde(default)]
    pub media_size: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn has_media(&self) -> bool {
        self.media_url.is_some()
    }

    /// Label used in notifications.
    pub fn author_label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Someone")
    }

    pub fn participant(&self) -> Participant {
        Participant {
            id: self.author_id,
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            photo_url: self.photo_url.clone(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

/// Insert payload for the message table.
///
/// Only constructible through [`NewMessage::text`] and [`NewMessage::media`],
/// so a row is either text-only or attachment-only with empty text.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewMessage {
    text: String,
    uid: UserId,
    display_name: String,
    photo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_type: Option<MediaKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_size: Option<i64>,
}

impl NewMessage {
    pub fn text(author: &Identity, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            uid: author.id,
            display_name: author.display_name_or_unknown().to_string(),
            photo_url: author.photo_url.clone().unwrap_or_default(),
            media_url: None,
            media_type: None,
            media_size: None,
        }
    }

    pub fn media(author: &Identity, url: impl Into<String>, kind: MediaKind, size: i64) -> Self {
        Self {
            text: String::new(),
            media_url: Some(url.into()),
            media_type: Some(kind),
            media_size: Some(size),
            ..Self::text(author, String::new())
        }
    }

    pub fn body(&self) -> &str {
        &self.text
    }

    pub fn author_id(&self) -> UserId {
        self.uid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn photo_url(&self) -> &str {
        &self.photo_url
    }

    pub fn media_url(&self) -> Option<&str> {
        self.media_url.as_deref()
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        self.media_type
    }

    pub fn media_size(&self) -> Option<i64> {
        self.media_size
    }

    /// Materialise the row the backend would store for this payload.
    pub fn into_message(self, id: MessageId, created_at: DateTime<Utc>) -> Message {
        Message {
            id,
            text: self.text,
            author_id: self.uid,
            display_name: Some(self.display_name),
            photo_url: Some(self.photo_url).filter(|p| !p.is_empty()),
            media_url: self.media_url,
            media_kind: self.media_type,
            media_size: self.media_size,
            created_at: Some(created_at),
        }
    }
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// A locally selected file waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
    /// Local reference shown while the file is pending.
    pub preview: String,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            preview: format!("local:{file_name}"),
            file_name,
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// File extension without the dot, `bin` when the name has none.
    pub fn extension(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
            _ => "bin",
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_content_type(&self.content_type)
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// Distinct author observed in the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    #[serde(rename = "uid")]
    pub id: UserId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub display_name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupSettings {
    pub name: String,
    #[serde(rename = "photo_url")]
    pub icon_url: String,
}

impl GroupSettings {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            icon_url: avatar_url_with(&name, &[("background", "0D8ABC"), ("color", "fff")]),
            name,
        }
    }
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self::named(DEFAULT_GROUP_NAME)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Row change pushed by the realtime feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(Message),
    Delete(MessageId),
}

impl ChangeEvent {
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::Insert(m) => m.id,
            Self::Delete(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Session transition reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub identity: Option<Identity>,
}

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use kinfolk_shared::constants::{
    GROUP_SETTINGS_ID, MESSAGES_TABLE, SETTINGS_TABLE, USERS_TABLE,
};
use kinfolk_shared::{GroupSettings, Message, MessageId, NewMessage, Participant, ProfileRow, UserId};

use super::{check, RestBackend};
use crate::error::{BackendError, Result};
use crate::MessageTable;

/// `settings` row; every column is optional since the table is free-form.
#[derive(Debug, Deserialize)]
struct SettingsRow {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

impl SettingsRow {
    fn into_group_settings(self) -> GroupSettings {
        let mut settings = match self.name.filter(|n| !n.trim().is_empty()) {
            Some(name) => GroupSettings::named(name),
            None => GroupSettings::default(),
        };
        if let Some(icon) = self.photo_url.filter(|p| !p.is_empty()) {
            settings.icon_url = icon;
        }
        settings
    }
}

#[derive(Debug, Deserialize)]
struct DeletedRow {
    id: MessageId,
}

/// PostgREST `in.(...)` list.
fn in_filter(ids: &[MessageId]) -> String {
    let joined = ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

fn table(name: &str) -> String {
    format!("rest/v1/{name}")
}

#[async_trait]
impl MessageTable for RestBackend {
    async fn select_messages(&self) -> Result<Vec<Message>> {
        let resp = self
            .authed(Method::GET, &table(MESSAGES_TABLE))
            .await
            .query(&[("select", "*"), ("order", "created_at.asc")])
            .send()
            .await?;
        let messages: Vec<Message> = check(resp).await?.json().await?;
        tracing::debug!(count = messages.len(), "messages fetched");
        Ok(messages)
    }

    async fn select_authors(&self) -> Result<Vec<Participant>> {
        let resp = self
            .authed(Method::GET, &table(MESSAGES_TABLE))
            .await
            .query(&[
                ("select", "uid,display_name,photo_url"),
                ("order", "created_at.desc"),
            ])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        let resp = self
            .authed(Method::POST, &table(MESSAGES_TABLE))
            .await
            .header("Prefer", "return=representation")
            .json(message)
            .send()
            .await?;
        let mut rows: Vec<Message> = check(resp).await?.json().await?;
        let stored = rows.pop().ok_or(BackendError::EmptyResponse)?;
        tracing::info!(msg_id = %stored.id, media = stored.has_media(), "message inserted");
        Ok(stored)
    }

    async fn delete_messages(&self, ids: &[MessageId], owner: UserId) -> Result<Vec<MessageId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let resp = self
            .authed(Method::DELETE, &table(MESSAGES_TABLE))
            .await
            .header("Prefer", "return=representation")
            .query(&[
                ("id", in_filter(ids)),
                ("uid", format!("eq.{owner}")),
                ("select", "id".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<DeletedRow> = check(resp).await?.json().await?;
        let deleted: Vec<MessageId> = rows.into_iter().map(|r| r.id).collect();
        tracing::info!(requested = ids.len(), deleted = deleted.len(), "messages deleted");
        Ok(deleted)
    }

    async fn probe(&self) -> Result<()> {
        let resp = self
            .authed(Method::GET, &table(MESSAGES_TABLE))
            .await
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn insert_profile(&self, profile: &ProfileRow) -> Result<()> {
        let resp = self
            .authed(Method::POST, &table(USERS_TABLE))
            .await
            .header("Prefer", "return=minimal")
            .json(profile)
            .send()
            .await?;
        check(resp).await?;
        tracing::debug!(user = %profile.id, "profile row written");
        Ok(())
    }

    async fn fetch_group_settings(&self) -> Result<Option<GroupSettings>> {
        let resp = self
            .authed(Method::GET, &table(SETTINGS_TABLE))
            .await
            .query(&[("select", "*".to_string()), ("id", format!("eq.{GROUP_SETTINGS_ID}"))])
            .send()
            .await?;
        let mut rows: Vec<SettingsRow> = check(resp).await?.json().await?;
        Ok(rows.pop().map(SettingsRow::into_group_settings))
    }
}

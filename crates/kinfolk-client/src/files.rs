//! Reading local files into attachments.

use std::path::Path;

use kinfolk_shared::error::Result;
use kinfolk_shared::{Attachment, ChatError};

/// Read a file from disk and guess its content type from the extension.
pub async fn load_attachment(path: &Path) -> Result<Attachment> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ChatError::InvalidInput(format!("Cannot read {}: {e}", path.display())))?;

    tracing::debug!(file = %file_name, size = bytes.len(), "attachment loaded");
    let content_type = content_type_for(&file_name);
    Ok(Attachment::new(file_name, content_type, bytes))
}

pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

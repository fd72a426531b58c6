use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;

use super::{check, RestBackend};
use crate::error::Result;
use crate::ObjectStorage;

#[async_trait]
impl ObjectStorage for RestBackend {
    async fn upload(&self, path: &str, content_type: &str, bytes: Bytes) -> Result<()> {
        let size = bytes.len();
        let object = format!("storage/v1/object/{}/{path}", self.config.media_bucket);
        let resp = self
            .authed(Method::POST, &object)
            .await
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("cache-control", "max-age=3600")
            .body(bytes)
            .send()
            .await?;
        check(resp).await?;
        tracing::info!(path, size, content_type, "object uploaded");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        self.config.endpoint(&format!(
            "storage/v1/object/public/{}/{path}",
            self.config.media_bucket
        ))
    }
}

//! # kinfolk
//!
//! Terminal front-end for the family chat.

use std::sync::Arc;

use kinfolk_backend::{Backend, RestBackend, SessionFile};
use kinfolk_client::config::AppConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();
    kinfolk_client::init_tracing();

    let config = AppConfig::from_env();
    tracing::info!(
        configured = config.backend_url.is_some(),
        bucket = %config.media_bucket,
        notifications = config.notifications,
        "loaded configuration"
    );

    let backend = match config.backend_config() {
        Some(backend_config) => {
            let store = match &config.data_dir {
                Some(dir) => Some(SessionFile::in_dir(dir)),
                None => SessionFile::default_location()
                    .map_err(|e| tracing::warn!(error = %e, "sessions will not persist"))
                    .ok(),
            };
            Some(Arc::new(RestBackend::new(backend_config, store)) as Arc<dyn Backend>)
        }
        None => None,
    };

    kinfolk_client::run(config, backend).await
}

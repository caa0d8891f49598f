pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod serializers;
pub mod services;

use std::sync::Arc;

use config::Config;
use db::{Database, Store};
use serializers::registry::Registries;
use services::audio::{AudioFetcher, HttpAudioFetcher};

pub use context::{RequestContext, RequestUser};
pub use error::{AppError, Result};

/// Everything the serializers need besides the request context.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub registries: Arc<Registries>,
    pub audio: Arc<dyn AudioFetcher>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config, audio: Arc<dyn AudioFetcher>) -> Self {
        Self {
            store,
            config,
            registries: Arc::new(Registries::standard()),
            audio,
        }
    }

    /// Opens the configured database, applies migrations and wires the
    /// HTTP audio client.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let db = Database::connect(&config.database_url).await?;
        db.run_migrations().await?;

        let audio = HttpAudioFetcher::new(config.audio_fetch_timeout)?;
        tracing::info!(database = %config.database_url, "annotator store ready");

        Ok(Self::new(Arc::new(db), config, Arc::new(audio)))
    }
}

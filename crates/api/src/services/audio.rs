// Remote audio ingestion for conversations.

use std::time::Duration;

use axum::async_trait;
use reqwest::{Client, Url};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    db::models::AudioFile,
    error::{AppError, Result},
};

#[derive(Debug)]
pub struct FetchedAudio {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Transport(String),
}

/// A GET-with-status-code client for audio sources.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedAudio, FetchError>;
}

pub struct HttpAudioFetcher {
    client: Client,
}

impl HttpAudioFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AudioFetcher for HttpAudioFetcher {
    async fn get(&self, url: &str) -> Result<FetchedAudio, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(FetchedAudio {
            status,
            body: body.to_vec(),
        })
    }
}

/// What happened to a requested audio download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFetch {
    NotRequested,
    Attached { file_name: String },
    Rejected { status: u16 },
    Failed { reason: String },
}

impl AudioFetch {
    pub fn is_attached(&self) -> bool {
        matches!(self, AudioFetch::Attached { .. })
    }
}

/// Accepts only absolute http(s) URLs.
pub fn validate_audio_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|_| AppError::Validation("Enter a valid URL.".to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::Validation("Enter a valid URL.".to_string()));
    }
    Ok(url)
}

/// Downloads `url` and wraps the body under a fresh `<uuid>.<extension>` name.
///
/// Only a 200 response attaches audio. Every other outcome is reported and
/// logged but never fails the caller.
pub async fn fetch_audio(
    fetcher: &dyn AudioFetcher,
    url: &str,
    extension: &str,
    timeout: Duration,
) -> (AudioFetch, Option<AudioFile>) {
    let fetched = match tokio::time::timeout(timeout, fetcher.get(url)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout),
    };

    match fetched {
        Ok(FetchedAudio { status: 200, body }) => {
            let name = format!("{}.{extension}", Uuid::new_v4());
            tracing::debug!(%url, file_name = %name, bytes = body.len(), "attached remote audio");
            (
                AudioFetch::Attached {
                    file_name: name.clone(),
                },
                Some(AudioFile {
                    name,
                    content: body,
                }),
            )
        }
        Ok(FetchedAudio { status, .. }) => {
            tracing::warn!(%url, status, "audio source answered without content, leaving audio unset");
            (AudioFetch::Rejected { status }, None)
        }
        Err(err) => {
            tracing::warn!(%url, error = %err, "audio download failed, leaving audio unset");
            (
                AudioFetch::Failed {
                    reason: err.to_string(),
                },
                None,
            )
        }
    }
}

#![allow(dead_code)]

use std::sync::Arc;

use annotator_api::{
    config::Config,
    db::{
        models::{NewProject, NewUser, Project, ProjectKind, ProjectType},
        Database,
    },
    logging,
    services::audio::{AudioFetcher, FetchError, FetchedAudio, HttpAudioFetcher},
    AppState, RequestContext, RequestUser,
};
use axum::async_trait;
use serde_json::{Map, Value};

/// Answers every request with the same status and body.
pub struct StaticFetcher {
    pub status: u16,
    pub body: Vec<u8>,
}

#[async_trait]
impl AudioFetcher for StaticFetcher {
    async fn get(&self, _url: &str) -> Result<FetchedAudio, FetchError> {
        Ok(FetchedAudio {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

pub async fn setup() -> AppState {
    setup_with_fetcher(Arc::new(StaticFetcher {
        status: 404,
        body: Vec::new(),
    }))
    .await
}

pub async fn setup_with_fetcher(audio: Arc<dyn AudioFetcher>) -> AppState {
    logging::init();

    let db = Database::connect("sqlite::memory:").await.unwrap();
    db.run_migrations().await.unwrap();

    AppState::new(Arc::new(db), Config::default(), audio)
}

pub async fn setup_with_http() -> AppState {
    let config = Config::default();
    let fetcher = HttpAudioFetcher::new(config.audio_fetch_timeout).unwrap();
    setup_with_fetcher(Arc::new(fetcher)).await
}

pub async fn user(state: &AppState, username: &str) -> RequestContext {
    let user = state
        .store
        .create_user(NewUser {
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: format!("{username}@example.com"),
            is_superuser: false,
        })
        .await
        .unwrap();

    RequestContext::for_user(RequestUser {
        id: user.id,
        username: user.username,
    })
}

pub async fn project(
    state: &AppState,
    kind: ProjectKind,
    project_type: ProjectType,
    collaborative_annotation: bool,
) -> Project {
    state
        .store
        .create_project(NewProject {
            kind,
            name: "Reviews".to_string(),
            description: String::new(),
            guideline: String::new(),
            users: Vec::new(),
            project_type,
            randomize_document_order: false,
            collaborative_annotation,
            admin: None,
        })
        .await
        .unwrap()
}

pub fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{
    document::{ConversationItemInput, CONVERSATION_ITEM},
    fields::{empty_object, Field, Shape},
};
use crate::{
    db::models::{attributes, AudioFile, Conversation, ConversationItem, NewConversation},
    error::{AppError, Result},
    services::audio::{fetch_audio, validate_audio_url, AudioFetch},
    AppState,
};

// The uploaded audio file travels next to the payload, not inside it.
pub static CONVERSATION: Shape = Shape {
    resource_type: "Conversation",
    fields: &[
        Field::new("id").read_only(),
        Field::new("audioFileUrl").source("audio_url").write_only(),
        Field::new("metadata").source("meta").default(empty_object),
        Field::new("sentences")
            .source("conversation_items")
            .write_only(),
    ],
};

#[derive(Debug, Deserialize)]
struct ConversationInput {
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default = "empty_object")]
    meta: Value,
    conversation_items: Vec<Map<String, Value>>,
}

#[derive(Debug)]
pub struct ConversationCreated {
    pub conversation: Conversation,
    pub items: Vec<ConversationItem>,
    pub audio: AudioFetch,
}

pub fn read(conversation: &Conversation) -> Result<Map<String, Value>> {
    Ok(CONVERSATION.to_representation(&attributes(conversation)?))
}

/// Creates a conversation and its sentences under `project_id`.
///
/// Runs in two stages: the audio download (when `audioFileUrl` is given)
/// finishes before anything is written, then the conversation and all of
/// its items are stored together. A failed download never fails the call;
/// the outcome is reported in [`ConversationCreated::audio`] and any
/// `upload` is kept instead.
pub async fn create(
    state: &AppState,
    project_id: i64,
    payload: &Map<String, Value>,
    upload: Option<AudioFile>,
) -> Result<ConversationCreated> {
    let project = state.store.get_project(project_id).await?;
    let input: ConversationInput = CONVERSATION.decode(CONVERSATION.to_internal(payload, false))?;

    let audio_url = input.audio_url.filter(|url| !url.is_empty());
    if let Some(url) = &audio_url {
        validate_audio_url(url)?;
    }

    let items = input
        .conversation_items
        .iter()
        .enumerate()
        .map(|(i, sentence)| {
            ConversationItemInput::decode(CONVERSATION_ITEM.to_internal(sentence, false))
                .map(ConversationItemInput::into_new)
                .map_err(|e| AppError::Validation(format!("sentences[{i}]: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let (audio, fetched) = match audio_url.as_deref() {
        Some(url) => {
            fetch_audio(
                state.audio.as_ref(),
                url,
                &state.config.audio_file_extension,
                state.config.audio_fetch_timeout,
            )
            .await
        }
        None => (AudioFetch::NotRequested, None),
    };

    let (conversation, items) = state
        .store
        .create_conversation(
            NewConversation {
                project_id: project.id,
                meta: input.meta,
                audio_url,
                audio_file: fetched.or(upload),
            },
            items,
        )
        .await?;

    Ok(ConversationCreated {
        conversation,
        items,
        audio,
    })
}

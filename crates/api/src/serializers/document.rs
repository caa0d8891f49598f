use serde::Deserialize;
use serde_json::{Map, Value};

use super::{
    annotation,
    fields::{empty_object, false_value, merge, resource_type, Field, Shape},
};
use crate::{
    context::RequestContext,
    db::models::{Document, DocumentKind, DocumentRecord, NewConversationItem, NewDocument},
    error::{AppError, Result},
    AppState,
};

pub static DOCUMENT: Shape = Shape {
    resource_type: "Document",
    fields: &[
        Field::new("id").read_only(),
        Field::new("text"),
        Field::new("annotations").read_only(),
        Field::new("meta").default(empty_object),
        Field::new("annotation_approver").read_only(),
    ],
};

pub static CONVERSATION_ITEM: Shape = Shape {
    resource_type: "ConversationItem",
    fields: &[
        Field::new("id").read_only(),
        Field::new("startTimeInSeconds").source("start_time"),
        Field::new("endTimeInSeconds").source("end_time"),
        Field::new("machineTranscription").source("machine_text"),
        Field::new("humanTranscription").source("text"),
        Field::new("textValidated")
            .source("text_validated")
            .default(false_value),
        Field::new("conversation").read_only(),
        Field::new("annotations").read_only(),
        Field::new("annotation_approver").read_only(),
    ],
};

#[derive(Debug, Deserialize)]
struct DocumentInput {
    text: String,
    #[serde(default = "empty_object")]
    meta: Value,
}

impl DocumentInput {
    fn validate(self) -> Result<Self> {
        if self.text.trim().is_empty() {
            return Err(AppError::Validation("text: This field may not be blank.".to_string()));
        }
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationItemInput {
    start_time: f64,
    end_time: f64,
    machine_text: String,
    text: String,
    #[serde(default)]
    text_validated: Option<bool>,
}

impl ConversationItemInput {
    pub(crate) fn decode(internal: Map<String, Value>) -> Result<Self> {
        let input: Self = CONVERSATION_ITEM.decode(internal)?;
        if input.start_time < 0.0 {
            return Err(AppError::Validation(
                "startTimeInSeconds: Ensure this value is greater than or equal to 0.".to_string(),
            ));
        }
        if input.end_time < input.start_time {
            return Err(AppError::Validation(
                "endTimeInSeconds: Must not be earlier than startTimeInSeconds.".to_string(),
            ));
        }
        Ok(input)
    }

    pub(crate) fn into_new(self) -> NewConversationItem {
        NewConversationItem {
            start_time: self.start_time,
            end_time: self.end_time,
            machine_text: self.machine_text,
            text: self.text,
            text_validated: self.text_validated.unwrap_or(false),
        }
    }
}

async fn annotations(state: &AppState, ctx: &RequestContext, document: &Document) -> Result<Value> {
    let project = state.store.get_project(document.project_id).await?;
    let kind = project.project_type.annotation_kind();

    // Without a caller there is nobody to filter by.
    let author = if project.collaborative_annotation {
        None
    } else {
        ctx.user_id()
    };

    let rows = state
        .store
        .document_annotations(kind, document.id, author)
        .await?;

    let shaped = rows
        .iter()
        .map(|a| annotation::represent(a).map(Value::Object))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Array(shaped))
}

async fn annotation_approver(state: &AppState, document: &Document) -> Result<Value> {
    let Some(user_id) = document.annotations_approved_by else {
        return Ok(Value::Null);
    };
    Ok(state
        .store
        .find_user(user_id)
        .await?
        .map(|user| Value::String(user.username))
        .unwrap_or(Value::Null))
}

/// Represents a document through the shape registered for its concrete kind.
pub async fn read(
    state: &AppState,
    ctx: &RequestContext,
    record: &DocumentRecord,
) -> Result<Map<String, Value>> {
    let shape = state.registries.documents.resolve(record.kind())?;
    let document = record.document();

    let mut attrs = record.attributes()?;
    attrs.insert("annotations".to_string(), annotations(state, ctx, document).await?);
    attrs.insert(
        "annotation_approver".to_string(),
        annotation_approver(state, document).await?,
    );

    Ok(shape.to_tagged_representation(&attrs))
}

pub async fn read_many(
    state: &AppState,
    ctx: &RequestContext,
    records: &[DocumentRecord],
) -> Result<Vec<Map<String, Value>>> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        out.push(read(state, ctx, record).await?);
    }
    Ok(out)
}

/// Creates a document under `project_id` from a polymorphic payload.
pub async fn create(
    state: &AppState,
    ctx: &RequestContext,
    project_id: i64,
    payload: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let tag = resource_type(payload)?;
    let (kind, shape) = state
        .registries
        .documents
        .resolve_tag(tag, DocumentKind::parse)?;

    match kind {
        DocumentKind::Document => {
            let input = shape
                .decode::<DocumentInput>(shape.to_internal(payload, false))?
                .validate()?;
            let project = state.store.get_project(project_id).await?;
            let record = state
                .store
                .create_document(NewDocument {
                    project_id: project.id,
                    text: input.text,
                    meta: input.meta,
                })
                .await?;
            read(state, ctx, &record).await
        }
        DocumentKind::ConversationItem => Err(AppError::Validation(
            "Conversation items are created through their conversation.".to_string(),
        )),
    }
}

/// Applies a partial update, dispatching on the stored record's kind.
pub async fn update(
    state: &AppState,
    ctx: &RequestContext,
    document_id: i64,
    payload: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut record = state.store.get_document(document_id).await?;
    let shape = state.registries.documents.resolve(record.kind())?;

    if let Ok(tag) = resource_type(payload) {
        if tag != shape.resource_type {
            return Err(AppError::Validation(format!(
                "resourcetype `{tag}` does not match the stored {}.",
                shape.resource_type
            )));
        }
    }

    let merged = merge(record.attributes()?, shape.to_internal(payload, true));
    match &mut record {
        DocumentRecord::Document(document) => {
            let input = shape.decode::<DocumentInput>(merged)?.validate()?;
            document.text = input.text;
            document.meta = input.meta;
        }
        DocumentRecord::ConversationItem(item) => {
            let input = ConversationItemInput::decode(merged)?;
            item.start_time = input.start_time;
            item.end_time = input.end_time;
            item.machine_text = input.machine_text;
            item.document.text = input.text;
            item.text_validated = input.text_validated;
        }
    }

    let record = state.store.save_document(&record).await?;
    tracing::debug!(document_id, kind = %record.kind(), "updated document");
    read(state, ctx, &record).await
}

/// Marks the document as approved by the caller, or clears the approval.
///
/// The response is built without a caller scope, so it lists every
/// contributor's annotations.
pub async fn approve(
    state: &AppState,
    ctx: &RequestContext,
    document_id: i64,
    approved: bool,
) -> Result<Map<String, Value>> {
    let mut record = state.store.get_document(document_id).await?;
    record.document_mut().annotations_approved_by = if approved {
        Some(ctx.user_id().ok_or_else(|| {
            AppError::Validation("An authenticated user is required to approve.".to_string())
        })?)
    } else {
        None
    };

    let record = state.store.save_document(&record).await?;
    read(state, &RequestContext::anonymous(), &record).await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::db::models::ConversationItem;

    fn item(text_validated: Option<bool>) -> DocumentRecord {
        DocumentRecord::ConversationItem(ConversationItem {
            document: Document {
                id: 11,
                project_id: 2,
                text: "hello there".to_string(),
                meta: json!({}),
                annotations_approved_by: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            conversation_id: 5,
            start_time: 1.0,
            end_time: 2.0,
            machine_text: "hello their".to_string(),
            text_validated,
        })
    }

    #[test]
    fn text_validated_defaults_to_false() {
        let shaped = CONVERSATION_ITEM.to_representation(&item(None).attributes().unwrap());
        assert_eq!(shaped["textValidated"], json!(false));

        let shaped = CONVERSATION_ITEM.to_representation(&item(Some(true)).attributes().unwrap());
        assert_eq!(shaped["textValidated"], json!(true));
        let shaped = CONVERSATION_ITEM.to_representation(&item(Some(false)).attributes().unwrap());
        assert_eq!(shaped["textValidated"], json!(false));
    }

    #[test]
    fn conversation_item_uses_external_names() {
        let shaped = CONVERSATION_ITEM.to_representation(&item(None).attributes().unwrap());
        assert_eq!(shaped["startTimeInSeconds"], json!(1.0));
        assert_eq!(shaped["machineTranscription"], json!("hello their"));
        assert_eq!(shaped["humanTranscription"], json!("hello there"));
        assert_eq!(shaped["conversation"], json!(5));
        assert!(!shaped.contains_key("text"));
        assert!(!shaped.contains_key("start_time"));
    }

    #[test]
    fn conversation_payload_cannot_move_items() {
        let payload = json!({"conversation": 9, "humanTranscription": "hi"});
        let internal = CONVERSATION_ITEM.to_internal(payload.as_object().unwrap(), true);
        assert_eq!(internal.len(), 1);
        assert_eq!(internal["text"], json!("hi"));
    }
}

use serde::Deserialize;
use serde_json::{Map, Value};

use super::fields::{Field, Shape};
use crate::{
    context::RequestContext,
    db::{
        models::{attributes, Annotation, AnnotationKind, NewAnnotation},
        Store,
    },
    error::{AppError, Result},
};

pub static DOCUMENT_ANNOTATION: Shape = Shape {
    resource_type: "DocumentAnnotation",
    fields: &[
        Field::new("id").read_only(),
        Field::new("prob"),
        Field::new("label"),
        Field::new("user").read_only(),
        Field::new("document"),
    ],
};

pub static SEQUENCE_ANNOTATION: Shape = Shape {
    resource_type: "SequenceAnnotation",
    fields: &[
        Field::new("id").read_only(),
        Field::new("prob"),
        Field::new("label"),
        Field::new("start_offset"),
        Field::new("end_offset"),
        Field::new("user").read_only(),
        Field::new("document"),
    ],
};

pub static SEQ2SEQ_ANNOTATION: Shape = Shape {
    resource_type: "Seq2seqAnnotation",
    fields: &[
        Field::new("id").read_only(),
        Field::new("text"),
        Field::new("user").read_only(),
        Field::new("document"),
        Field::new("prob"),
    ],
};

pub static CONVERSATION_ITEM_ANNOTATION: Shape = Shape {
    resource_type: "ConversationItemAnnotation",
    fields: &[
        Field::new("id").read_only(),
        Field::new("prob"),
        Field::new("label"),
        Field::new("start_offset"),
        Field::new("end_offset"),
        Field::new("user").read_only(),
        Field::new("document"),
    ],
};

pub fn shape_for(kind: AnnotationKind) -> &'static Shape {
    match kind {
        AnnotationKind::Document => &DOCUMENT_ANNOTATION,
        AnnotationKind::Sequence => &SEQUENCE_ANNOTATION,
        AnnotationKind::Seq2seq => &SEQ2SEQ_ANNOTATION,
        AnnotationKind::ConversationItem => &CONVERSATION_ITEM_ANNOTATION,
    }
}

pub fn represent(annotation: &Annotation) -> Result<Map<String, Value>> {
    Ok(shape_for(annotation.kind).to_representation(&attributes(annotation)?))
}

#[derive(Debug, Deserialize)]
struct AnnotationInput {
    #[serde(default)]
    prob: f64,
    #[serde(default)]
    label: Option<i64>,
    #[serde(default)]
    start_offset: Option<i64>,
    #[serde(default)]
    end_offset: Option<i64>,
    #[serde(default)]
    text: Option<String>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| AppError::Validation(format!("{field}: This field is required.")))
}

/// Validates an annotation payload for `kind` against `document_id`, which
/// lives in `project_id`.
///
/// The contributing user is never read from the payload.
pub async fn validate(
    store: &dyn Store,
    kind: AnnotationKind,
    project_id: i64,
    document_id: i64,
    user_id: i64,
    payload: &Map<String, Value>,
) -> Result<NewAnnotation> {
    let shape = shape_for(kind);
    let mut internal = shape.to_internal(payload, false);
    internal.remove("document");
    let input: AnnotationInput = shape.decode(internal)?;

    let label = if kind.has_label() {
        let label = required(input.label, "label")?;
        match store.find_label(label).await? {
            None => {
                return Err(AppError::Validation(format!(
                    "label: Invalid pk \"{label}\" - object does not exist."
                )))
            }
            Some(found) if found.project_id != project_id => {
                return Err(AppError::Validation(format!(
                    "label: Label \"{label}\" belongs to another project."
                )))
            }
            Some(_) => {}
        }
        Some(label)
    } else {
        None
    };

    let (start_offset, end_offset) = if kind.has_span() {
        let start = required(input.start_offset, "start_offset")?;
        let end = required(input.end_offset, "end_offset")?;
        if start > end {
            return Err(AppError::Validation(
                "start_offset must not be greater than end_offset.".to_string(),
            ));
        }
        (Some(start), Some(end))
    } else {
        (None, None)
    };

    let text = match kind {
        AnnotationKind::Seq2seq => Some(required(input.text, "text")?),
        _ => None,
    };

    Ok(NewAnnotation {
        kind,
        document_id,
        user_id,
        prob: input.prob,
        label,
        start_offset,
        end_offset,
        text,
    })
}

/// Creates an annotation on a document as the requesting user, using the
/// annotation kind the document's project is configured for.
pub async fn create(
    store: &dyn Store,
    ctx: &RequestContext,
    document_id: i64,
    payload: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let user_id = ctx
        .user_id()
        .ok_or_else(|| AppError::Validation("user: An authenticated user is required.".to_string()))?;
    let document = store.get_document(document_id).await?;
    let project = store.get_project(document.document().project_id).await?;
    let kind = project.project_type.annotation_kind();

    let annotation = validate(store, kind, project.id, document_id, user_id, payload).await?;
    let annotation = store.create_annotation(annotation).await?;
    represent(&annotation)
}

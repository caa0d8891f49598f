mod common;

use annotator_api::{
    db::models::{NewLabel, ProjectKind, ProjectType},
    serializers::{annotation, document},
    AppError, AppState, RequestContext,
};
use serde_json::json;

use common::{payload, project, setup, user};

async fn document_in(state: &AppState, kind: ProjectKind, project_type: ProjectType) -> (i64, i64) {
    let p = project(state, kind, project_type, false).await;
    let label = state
        .store
        .create_label(NewLabel {
            project_id: p.id,
            text: "LOC".to_string(),
            prefix_key: None,
            suffix_key: None,
            background_color: "#209cee".to_string(),
            text_color: "#ffffff".to_string(),
        })
        .await
        .unwrap();
    let doc = document::create(
        state,
        &RequestContext::anonymous(),
        p.id,
        &payload(json!({"resourcetype": "Document", "text": "Paris is lovely"})),
    )
    .await
    .unwrap();
    (doc["id"].as_i64().unwrap(), label.id)
}

#[tokio::test]
async fn span_offsets_must_be_ordered() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let (doc, label) = document_in(&state, ProjectKind::SequenceLabelingProject, ProjectType::SequenceLabeling).await;

    let created = annotation::create(
        state.store.as_ref(),
        &alice,
        doc,
        &payload(json!({"label": label, "start_offset": 0, "end_offset": 5})),
    )
    .await
    .unwrap();
    assert_eq!(created["start_offset"], json!(0));
    assert_eq!(created["end_offset"], json!(5));
    assert_eq!(created["prob"], json!(0.0));

    let err = annotation::create(
        state.store.as_ref(),
        &alice,
        doc,
        &payload(json!({"label": label, "start_offset": 6, "end_offset": 5})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = annotation::create(
        state.store.as_ref(),
        &alice,
        doc,
        &payload(json!({"label": label, "start_offset": 6})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn labels_must_exist() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let (doc, _) = document_in(&state, ProjectKind::TextClassificationProject, ProjectType::DocumentClassification).await;

    let err = annotation::create(state.store.as_ref(), &alice, doc, &payload(json!({"label": 9000})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref msg) if msg.starts_with("label: Invalid pk")));

    let err = annotation::create(state.store.as_ref(), &alice, doc, &payload(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn user_comes_from_the_caller() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let bob = user(&state, "bob").await;
    let (doc, label) = document_in(&state, ProjectKind::TextClassificationProject, ProjectType::DocumentClassification).await;

    let created = annotation::create(
        state.store.as_ref(),
        &alice,
        doc,
        &payload(json!({"label": label, "user": bob.user_id().unwrap(), "prob": 0.75})),
    )
    .await
    .unwrap();
    assert_eq!(created["user"], json!(alice.user_id().unwrap()));
    assert_eq!(created["document"], json!(doc));
    assert!(!created.contains_key("start_offset"));

    let err = annotation::create(
        state.store.as_ref(),
        &RequestContext::anonymous(),
        doc,
        &payload(json!({"label": label})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn seq2seq_annotations_carry_text_not_labels() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let (doc, _) = document_in(&state, ProjectKind::Seq2seqProject, ProjectType::Seq2seq).await;

    let created = annotation::create(
        state.store.as_ref(),
        &alice,
        doc,
        &payload(json!({"text": "Paris est charmante"})),
    )
    .await
    .unwrap();
    assert_eq!(created["text"], json!("Paris est charmante"));
    assert!(!created.contains_key("label"));

    let err = annotation::create(state.store.as_ref(), &alice, doc, &payload(json!({"prob": 1.0})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn labels_from_other_projects_are_rejected() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let (doc, _) = document_in(&state, ProjectKind::TextClassificationProject, ProjectType::DocumentClassification).await;
    let (_, foreign) = document_in(&state, ProjectKind::TextClassificationProject, ProjectType::DocumentClassification).await;

    let err = annotation::create(state.store.as_ref(), &alice, doc, &payload(json!({"label": foreign})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("another project")));
}

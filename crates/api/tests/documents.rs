mod common;

use annotator_api::{
    db::models::{NewLabel, ProjectKind, ProjectType},
    serializers::{annotation, document},
    AppError, AppState, RequestContext,
};
use serde_json::{json, Value};

use common::{payload, project, setup, user};

async fn label(state: &AppState, project_id: i64) -> i64 {
    state
        .store
        .create_label(NewLabel {
            project_id,
            text: "positive".to_string(),
            prefix_key: None,
            suffix_key: None,
            background_color: "#209cee".to_string(),
            text_color: "#ffffff".to_string(),
        })
        .await
        .unwrap()
        .id
}

async fn document_id(state: &AppState, ctx: &RequestContext, project_id: i64, text: &str) -> i64 {
    let created = document::create(
        state,
        ctx,
        project_id,
        &payload(json!({"resourcetype": "Document", "text": text})),
    )
    .await
    .unwrap();
    created["id"].as_i64().unwrap()
}

async fn annotate(state: &AppState, ctx: &RequestContext, document_id: i64, label_id: i64) {
    annotation::create(
        state.store.as_ref(),
        ctx,
        document_id,
        &payload(json!({"label": label_id, "prob": 0.9})),
    )
    .await
    .unwrap();
}

async fn read(state: &AppState, ctx: &RequestContext, document_id: i64) -> serde_json::Map<String, Value> {
    let record = state.store.get_document(document_id).await.unwrap();
    document::read(state, ctx, &record).await.unwrap()
}

fn annotation_users(representation: &serde_json::Map<String, Value>) -> Vec<i64> {
    representation["annotations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["user"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn non_collaborative_reads_only_show_the_callers_annotations() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let bob = user(&state, "bob").await;
    let p = project(&state, ProjectKind::TextClassificationProject, ProjectType::DocumentClassification, false).await;
    let positive = label(&state, p.id).await;

    let d1 = document_id(&state, &alice, p.id, "great film").await;
    let d2 = document_id(&state, &alice, p.id, "dull film").await;
    annotate(&state, &alice, d1, positive).await;
    annotate(&state, &bob, d2, positive).await;

    let as_alice = read(&state, &alice, d1).await;
    assert_eq!(annotation_users(&as_alice), vec![alice.user_id().unwrap()]);

    let as_bob = read(&state, &bob, d1).await;
    assert!(annotation_users(&as_bob).is_empty());

    // No caller, no filter.
    let anonymous = read(&state, &RequestContext::anonymous(), d2).await;
    assert_eq!(annotation_users(&anonymous), vec![bob.user_id().unwrap()]);
}

#[tokio::test]
async fn collaborative_reads_show_everyones_annotations() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let bob = user(&state, "bob").await;
    let p = project(&state, ProjectKind::TextClassificationProject, ProjectType::DocumentClassification, true).await;
    let positive = label(&state, p.id).await;

    let d1 = document_id(&state, &alice, p.id, "great film").await;
    annotate(&state, &alice, d1, positive).await;
    annotate(&state, &bob, d1, positive).await;

    let as_bob = read(&state, &bob, d1).await;
    assert_eq!(
        annotation_users(&as_bob),
        vec![alice.user_id().unwrap(), bob.user_id().unwrap()]
    );
}

#[tokio::test]
async fn document_shape() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let p = project(&state, ProjectKind::Project, ProjectType::DocumentClassification, false).await;

    let created = document::create(
        &state,
        &alice,
        p.id,
        &payload(json!({"resourcetype": "Document", "text": "hello", "annotations": [1, 2]})),
    )
    .await
    .unwrap();

    assert_eq!(created["resourcetype"], json!("Document"));
    assert_eq!(created["text"], json!("hello"));
    assert_eq!(created["meta"], json!({}));
    assert_eq!(created["annotations"], json!([]));
    assert_eq!(created["annotation_approver"], Value::Null);
}

#[tokio::test]
async fn document_payloads_are_validated() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let p = project(&state, ProjectKind::Project, ProjectType::DocumentClassification, false).await;

    let blank = document::create(&state, &alice, p.id, &payload(json!({"resourcetype": "Document", "text": "  "})))
        .await
        .unwrap_err();
    assert!(matches!(blank, AppError::Validation(_)));

    let untagged = document::create(&state, &alice, p.id, &payload(json!({"text": "hello"})))
        .await
        .unwrap_err();
    assert!(matches!(untagged, AppError::Validation(_)));

    let unknown = document::create(&state, &alice, p.id, &payload(json!({"resourcetype": "Image", "text": "x"})))
        .await
        .unwrap_err();
    assert!(matches!(unknown, AppError::Validation(_)));

    let item = document::create(
        &state,
        &alice,
        p.id,
        &payload(json!({
            "resourcetype": "ConversationItem",
            "startTimeInSeconds": 0.0,
            "endTimeInSeconds": 1.0,
            "machineTranscription": "hi",
            "humanTranscription": "hi",
        })),
    )
    .await
    .unwrap_err();
    assert!(matches!(item, AppError::Validation(_)));
}

#[tokio::test]
async fn partial_update_keeps_untouched_fields() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let p = project(&state, ProjectKind::Project, ProjectType::DocumentClassification, false).await;

    let created = document::create(
        &state,
        &alice,
        p.id,
        &payload(json!({"resourcetype": "Document", "text": "hello", "meta": {"source": "web"}})),
    )
    .await
    .unwrap();
    let id = created["id"].as_i64().unwrap();

    let updated = document::update(&state, &alice, id, &payload(json!({"text": "hello there"})))
        .await
        .unwrap();
    assert_eq!(updated["text"], json!("hello there"));
    assert_eq!(updated["meta"], json!({"source": "web"}));

    let mismatched = document::update(
        &state,
        &alice,
        id,
        &payload(json!({"resourcetype": "ConversationItem", "text": "x"})),
    )
    .await
    .unwrap_err();
    assert!(matches!(mismatched, AppError::Validation(_)));
}

#[tokio::test]
async fn approval_sets_and_clears_the_approver() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let bob = user(&state, "bob").await;
    let p = project(&state, ProjectKind::TextClassificationProject, ProjectType::DocumentClassification, false).await;
    let positive = label(&state, p.id).await;

    let d1 = document_id(&state, &alice, p.id, "great film").await;
    annotate(&state, &alice, d1, positive).await;
    annotate(&state, &bob, d1, positive).await;

    let approved = document::approve(&state, &bob, d1, true).await.unwrap();
    assert_eq!(approved["annotation_approver"], json!("bob"));
    assert_eq!(approved["annotations"].as_array().unwrap().len(), 2);

    let cleared = document::approve(&state, &bob, d1, false).await.unwrap();
    assert_eq!(cleared["annotation_approver"], Value::Null);

    let anonymous = document::approve(&state, &RequestContext::anonymous(), d1, true)
        .await
        .unwrap_err();
    assert!(matches!(anonymous, AppError::Validation(_)));
}

#[tokio::test]
async fn missing_document_is_not_found() {
    let state = setup().await;
    let alice = user(&state, "alice").await;
    let err = document::update(&state, &alice, 77, &payload(json!({"text": "x"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

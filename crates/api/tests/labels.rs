mod common;

use annotator_api::{
    db::models::{ProjectKind, ProjectType},
    serializers::label::{self, LabelScope},
    AppError,
};
use serde_json::json;

use common::{payload, project, setup};

#[tokio::test]
async fn labels_without_keys_are_always_valid() {
    let state = setup().await;
    let p = project(&state, ProjectKind::SequenceLabelingProject, ProjectType::SequenceLabeling, false).await;

    label::create(state.store.as_ref(), p.id, &payload(json!({"text": "PER"})))
        .await
        .unwrap();
    label::create(state.store.as_ref(), p.id, &payload(json!({"text": "ORG"})))
        .await
        .unwrap();

    let scope = LabelScope {
        project_id: p.id,
        label_id: None,
    };
    label::validate(state.store.as_ref(), Some(scope), None, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn prefix_without_suffix_is_rejected() {
    let state = setup().await;
    let p = project(&state, ProjectKind::SequenceLabelingProject, ProjectType::SequenceLabeling, false).await;

    let err = label::create(
        state.store.as_ref(),
        p.id,
        &payload(json!({"text": "PER", "prefix_key": "ctrl"})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref msg) if msg == "Shortcut key requires a suffix key."));

    // Scope does not matter for this rule.
    let err = label::validate(state.store.as_ref(), None, Some("ctrl"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn duplicate_shortcut_on_create() {
    let state = setup().await;
    let p = project(&state, ProjectKind::SequenceLabelingProject, ProjectType::SequenceLabeling, false).await;

    label::create(
        state.store.as_ref(),
        p.id,
        &payload(json!({"text": "PER", "prefix_key": "ctrl", "suffix_key": "p"})),
    )
    .await
    .unwrap();

    let err = label::create(
        state.store.as_ref(),
        p.id,
        &payload(json!({"text": "PERSON", "prefix_key": "ctrl", "suffix_key": "p"})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref msg) if msg == "Duplicate shortcut key."));

    // Suffix-only shortcuts collide too.
    label::create(state.store.as_ref(), p.id, &payload(json!({"text": "LOC", "suffix_key": "l"})))
        .await
        .unwrap();
    let err = label::create(state.store.as_ref(), p.id, &payload(json!({"text": "GPE", "suffix_key": "l"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn same_shortcut_in_another_project_is_fine() {
    let state = setup().await;
    let first = project(&state, ProjectKind::SequenceLabelingProject, ProjectType::SequenceLabeling, false).await;
    let second = project(&state, ProjectKind::SequenceLabelingProject, ProjectType::SequenceLabeling, false).await;

    let body = payload(json!({"text": "PER", "prefix_key": "ctrl", "suffix_key": "p"}));
    label::create(state.store.as_ref(), first.id, &body).await.unwrap();
    label::create(state.store.as_ref(), second.id, &body).await.unwrap();
}

#[tokio::test]
async fn update_colliding_with_another_label_fails() {
    let state = setup().await;
    let p = project(&state, ProjectKind::SequenceLabelingProject, ProjectType::SequenceLabeling, false).await;

    label::create(
        state.store.as_ref(),
        p.id,
        &payload(json!({"text": "PER", "prefix_key": "ctrl", "suffix_key": "p"})),
    )
    .await
    .unwrap();
    let org = label::create(
        state.store.as_ref(),
        p.id,
        &payload(json!({"text": "ORG", "prefix_key": "ctrl", "suffix_key": "o"})),
    )
    .await
    .unwrap();
    let org_id = org["id"].as_i64().unwrap();

    let err = label::update(state.store.as_ref(), org_id, &payload(json!({"suffix_key": "p"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref msg) if msg == "Duplicate shortcut key."));
}

#[tokio::test]
async fn update_colliding_only_with_itself_succeeds() {
    let state = setup().await;
    let p = project(&state, ProjectKind::SequenceLabelingProject, ProjectType::SequenceLabeling, false).await;

    let created = label::create(
        state.store.as_ref(),
        p.id,
        &payload(json!({"text": "PER", "prefix_key": "ctrl", "suffix_key": "p"})),
    )
    .await
    .unwrap();
    let id = created["id"].as_i64().unwrap();

    let updated = label::update(
        state.store.as_ref(),
        id,
        &payload(json!({"text": "Person", "background_color": "#ff0000"})),
    )
    .await
    .unwrap();

    assert_eq!(updated["text"], json!("Person"));
    assert_eq!(updated["prefix_key"], json!("ctrl"));
    assert_eq!(updated["suffix_key"], json!("p"));
    assert_eq!(updated["background_color"], json!("#ff0000"));
    assert_eq!(updated["text_color"], json!("#ffffff"));
}

#[tokio::test]
async fn no_scope_skips_the_uniqueness_check() {
    let state = setup().await;
    let p = project(&state, ProjectKind::SequenceLabelingProject, ProjectType::SequenceLabeling, false).await;

    label::create(
        state.store.as_ref(),
        p.id,
        &payload(json!({"text": "PER", "prefix_key": "ctrl", "suffix_key": "p"})),
    )
    .await
    .unwrap();

    label::validate(state.store.as_ref(), None, Some("ctrl"), Some("p"))
        .await
        .unwrap();

    let scope = LabelScope {
        project_id: p.id,
        label_id: None,
    };
    assert!(label::validate(state.store.as_ref(), Some(scope), Some("ctrl"), Some("p"))
        .await
        .is_err());
}

#[tokio::test]
async fn labels_need_an_existing_project() {
    let state = setup().await;
    let err = label::create(state.store.as_ref(), 404, &payload(json!({"text": "PER"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

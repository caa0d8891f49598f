use serde::Deserialize;
use serde_json::{Map, Value};

use super::fields::{merge, Field, Shape};
use crate::{
    db::{
        models::{attributes, Label, NewLabel},
        Store,
    },
    error::{AppError, Result},
};

fn default_background_color() -> Value {
    Value::String("#209cee".to_string())
}

fn default_text_color() -> Value {
    Value::String("#ffffff".to_string())
}

pub static LABEL: Shape = Shape {
    resource_type: "Label",
    fields: &[
        Field::new("id").read_only(),
        Field::new("text"),
        Field::new("prefix_key"),
        Field::new("suffix_key"),
        Field::new("background_color").default(default_background_color),
        Field::new("text_color").default(default_text_color),
    ],
};

const PREFIX_KEYS: [&str; 3] = ["ctrl", "shift", "ctrl shift"];

/// Where a label lives, for the per-project shortcut uniqueness check.
///
/// `label_id` is the label being updated, which never collides with itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelScope {
    pub project_id: i64,
    pub label_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LabelInput {
    text: String,
    #[serde(default)]
    prefix_key: Option<String>,
    #[serde(default)]
    suffix_key: Option<String>,
    background_color: String,
    text_color: String,
}

fn blank_to_none(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.is_empty())
}

impl LabelInput {
    fn validate(mut self) -> Result<Self> {
        if self.text.trim().is_empty() {
            return Err(AppError::Validation("text: This field may not be blank.".to_string()));
        }

        self.prefix_key = blank_to_none(self.prefix_key);
        self.suffix_key = blank_to_none(self.suffix_key);

        if let Some(prefix) = self.prefix_key.as_deref() {
            if !PREFIX_KEYS.contains(&prefix) {
                return Err(AppError::Validation(format!(
                    "prefix_key: \"{prefix}\" is not a valid choice."
                )));
            }
        }
        if let Some(suffix) = self.suffix_key.as_deref() {
            let mut chars = suffix.chars();
            let valid = matches!(
                (chars.next(), chars.next()),
                (Some(c), None) if c.is_ascii_digit() || c.is_ascii_lowercase()
            );
            if !valid {
                return Err(AppError::Validation(format!(
                    "suffix_key: \"{suffix}\" is not a valid choice."
                )));
            }
        }
        Ok(self)
    }
}

/// Checks the shortcut-key rules for a candidate label.
///
/// A prefix always needs a suffix. The pair must be unique among the other
/// labels of the scoped project; with `scope` set to `None` that lookup is
/// skipped.
pub async fn validate(
    store: &dyn Store,
    scope: Option<LabelScope>,
    prefix_key: Option<&str>,
    suffix_key: Option<&str>,
) -> Result<()> {
    match (prefix_key, suffix_key) {
        (None, None) => return Ok(()),
        (Some(_), None) => {
            return Err(AppError::Validation(
                "Shortcut key requires a suffix key.".to_string(),
            ))
        }
        _ => {}
    }

    let Some(scope) = scope else {
        tracing::debug!("no label scope given, skipping shortcut uniqueness check");
        return Ok(());
    };

    if store
        .shortcut_taken(scope.project_id, prefix_key, suffix_key, scope.label_id)
        .await?
    {
        return Err(AppError::Validation("Duplicate shortcut key.".to_string()));
    }
    Ok(())
}

pub fn read(label: &Label) -> Result<Map<String, Value>> {
    Ok(LABEL.to_representation(&attributes(label)?))
}

pub async fn create(
    store: &dyn Store,
    project_id: i64,
    payload: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let project = store.get_project(project_id).await?;
    let input = LABEL
        .decode::<LabelInput>(LABEL.to_internal(payload, false))?
        .validate()?;

    let scope = LabelScope {
        project_id: project.id,
        label_id: None,
    };
    validate(
        store,
        Some(scope),
        input.prefix_key.as_deref(),
        input.suffix_key.as_deref(),
    )
    .await?;

    let label = store
        .create_label(NewLabel {
            project_id: project.id,
            text: input.text,
            prefix_key: input.prefix_key,
            suffix_key: input.suffix_key,
            background_color: input.background_color,
            text_color: input.text_color,
        })
        .await?;
    read(&label)
}

/// Applies a partial update; absent fields keep their stored values.
pub async fn update(
    store: &dyn Store,
    label_id: i64,
    payload: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut label = store.get_label(label_id).await?;
    let merged = merge(attributes(&label)?, LABEL.to_internal(payload, true));
    let input = LABEL.decode::<LabelInput>(merged)?.validate()?;

    let scope = LabelScope {
        project_id: label.project_id,
        label_id: Some(label.id),
    };
    validate(
        store,
        Some(scope),
        input.prefix_key.as_deref(),
        input.suffix_key.as_deref(),
    )
    .await?;

    label.text = input.text;
    label.prefix_key = input.prefix_key;
    label.suffix_key = input.suffix_key;
    label.background_color = input.background_color;
    label.text_color = input.text_color;

    let label = store.save_label(&label).await?;
    read(&label)
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fields::{merge, resource_type, Field, Shape};
use crate::{
    context::RequestContext,
    db::models::{attributes, NewProject, Project, ProjectAdmin, ProjectKind, ProjectType},
    error::{AppError, Result},
    AppState,
};

const TYPED_FIELDS: &[Field] = &[
    Field::new("id").read_only(),
    Field::new("name"),
    Field::new("description"),
    Field::new("guideline"),
    Field::new("users").read_only(),
    Field::new("current_users_role").read_only(),
    Field::new("project_type"),
    Field::new("image").read_only(),
    Field::new("updated_at").read_only(),
    Field::new("randomize_document_order"),
];

pub static PROJECT: Shape = Shape {
    resource_type: "Project",
    fields: &[
        Field::new("id").read_only(),
        Field::new("name"),
        Field::new("description"),
        Field::new("guideline"),
        Field::new("users"),
        Field::new("current_users_role").read_only(),
        Field::new("project_type"),
        Field::new("image").read_only(),
        Field::new("updated_at").read_only(),
        Field::new("randomize_document_order"),
        Field::new("collaborative_annotation"),
    ],
};

pub static TEXT_CLASSIFICATION_PROJECT: Shape = Shape {
    resource_type: "TextClassificationProject",
    fields: TYPED_FIELDS,
};

pub static SEQUENCE_LABELING_PROJECT: Shape = Shape {
    resource_type: "SequenceLabelingProject",
    fields: TYPED_FIELDS,
};

pub static SEQ2SEQ_PROJECT: Shape = Shape {
    resource_type: "Seq2seqProject",
    fields: TYPED_FIELDS,
};

pub static CONVERSATIONS_PROJECT: Shape = Shape {
    resource_type: "ConversationsProject",
    fields: TYPED_FIELDS,
};

const NAME_MAX_CHARS: usize = 100;

/// The project type a typed project kind is pinned to.
fn pinned_type(kind: ProjectKind) -> Option<ProjectType> {
    match kind {
        ProjectKind::Project => None,
        ProjectKind::TextClassificationProject => Some(ProjectType::DocumentClassification),
        ProjectKind::SequenceLabelingProject => Some(ProjectType::SequenceLabeling),
        ProjectKind::Seq2seqProject => Some(ProjectType::Seq2seq),
        ProjectKind::ConversationsProject => Some(ProjectType::Conversations),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleFlags {
    pub is_project_admin: bool,
    pub is_annotator: bool,
    pub is_annotation_approver: bool,
}

#[derive(Debug, Deserialize)]
struct ProjectInput {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    guideline: String,
    #[serde(default)]
    users: Vec<i64>,
    project_type: ProjectType,
    #[serde(default)]
    randomize_document_order: bool,
    #[serde(default)]
    collaborative_annotation: bool,
}

impl ProjectInput {
    fn validate(self, kind: ProjectKind) -> Result<Self> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("name: This field may not be blank.".to_string()));
        }
        if self.name.chars().count() > NAME_MAX_CHARS {
            return Err(AppError::Validation(format!(
                "name: Ensure this field has no more than {NAME_MAX_CHARS} characters."
            )));
        }
        if let Some(pinned) = pinned_type(kind) {
            if pinned != self.project_type {
                return Err(AppError::Validation(format!(
                    "project_type: {kind} requires `{}`.",
                    pinned.as_str()
                )));
            }
        }
        Ok(self)
    }
}

/// Resolves the caller's role flags on a project.
///
/// With no role mappings stored at all every flag is false. Once any mapping
/// exists the lookup is strict: a caller without a mapping for this project
/// gets `NotFound`.
pub async fn current_users_role(
    state: &AppState,
    ctx: &RequestContext,
    project_id: i64,
) -> Result<RoleFlags> {
    if !state.store.has_role_mappings().await? {
        return Ok(RoleFlags::default());
    }

    let not_found = || AppError::NotFound("No role mapping for this project.".to_string());
    let user_id = ctx.user_id().ok_or_else(not_found)?;
    let role = state
        .store
        .role_name_for(project_id, user_id)
        .await?
        .ok_or_else(not_found)?;

    let names = &state.config.roles;
    Ok(RoleFlags {
        is_project_admin: role == names.project_admin,
        is_annotator: role == names.annotator,
        is_annotation_approver: role == names.annotation_approver,
    })
}

pub async fn read(
    state: &AppState,
    ctx: &RequestContext,
    project: &Project,
) -> Result<Map<String, Value>> {
    let shape = state.registries.projects.resolve(project.kind)?;
    let flags = current_users_role(state, ctx, project.id).await?;

    let mut attrs = attributes(project)?;
    attrs.insert(
        "current_users_role".to_string(),
        serde_json::json!({
            "is_project_admin": flags.is_project_admin,
            "is_annotator": flags.is_annotator,
            "is_annotation_approver": flags.is_annotation_approver,
        }),
    );
    Ok(shape.to_tagged_representation(&attrs))
}

pub async fn read_many(
    state: &AppState,
    ctx: &RequestContext,
    projects: &[Project],
) -> Result<Vec<Map<String, Value>>> {
    let mut out = Vec::with_capacity(projects.len());
    for project in projects {
        out.push(read(state, ctx, project).await?);
    }
    Ok(out)
}

async fn check_users_exist(state: &AppState, users: &[i64]) -> Result<()> {
    for id in users {
        if state.store.find_user(*id).await?.is_none() {
            return Err(AppError::Validation(format!(
                "users: Invalid pk \"{id}\" - object does not exist."
            )));
        }
    }
    Ok(())
}

/// Picks the admin mapping written together with a new project.
///
/// Once role mappings are in use, reading a project requires one, so a
/// creator who would end up without it is refused before anything is
/// written.
async fn creator_admin(state: &AppState, ctx: &RequestContext) -> Result<Option<ProjectAdmin>> {
    let admin_role = &state.config.roles.project_admin;
    let role = state.store.find_role_by_name(admin_role).await?;

    match (ctx.user_id(), role) {
        (Some(user_id), Some(role)) => Ok(Some(ProjectAdmin {
            user_id,
            role_id: role.id,
        })),
        (user_id, _) => {
            if !state.store.has_role_mappings().await? {
                return Ok(None);
            }
            if user_id.is_none() {
                return Err(AppError::Validation(
                    "An authenticated user is required to create a project.".to_string(),
                ));
            }
            Err(AppError::Validation(format!(
                "Role `{admin_role}` must exist before projects can be created."
            )))
        }
    }
}

/// Creates a project of the kind named by the payload's `resourcetype`.
///
/// The caller always becomes a member and, when a project-admin role is
/// defined, that project's admin in the same write.
pub async fn create(
    state: &AppState,
    ctx: &RequestContext,
    payload: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let tag = resource_type(payload)?;
    let (kind, shape) = state
        .registries
        .projects
        .resolve_tag(tag, ProjectKind::parse)?;

    let mut internal = shape.to_internal(payload, false);
    if let Some(pinned) = pinned_type(kind) {
        internal
            .entry("project_type")
            .or_insert_with(|| Value::String(pinned.as_str().to_string()));
    }
    let input = shape.decode::<ProjectInput>(internal)?.validate(kind)?;

    let mut users = if shape.field("users").is_some_and(Field::is_writable) {
        input.users
    } else {
        Vec::new()
    };
    if let Some(user_id) = ctx.user_id() {
        if !users.contains(&user_id) {
            users.push(user_id);
        }
    }
    check_users_exist(state, &users).await?;

    let collaborative_annotation = shape.field("collaborative_annotation").is_some()
        && input.collaborative_annotation;
    let admin = creator_admin(state, ctx).await?;

    let project = state
        .store
        .create_project(NewProject {
            kind,
            name: input.name,
            description: input.description,
            guideline: input.guideline,
            users,
            project_type: input.project_type,
            randomize_document_order: input.randomize_document_order,
            collaborative_annotation,
            admin,
        })
        .await?;

    read(state, ctx, &project).await
}

/// Updates a project through the base shape, whatever its concrete kind.
///
/// Absent fields keep their stored values.
pub async fn update(
    state: &AppState,
    ctx: &RequestContext,
    project_id: i64,
    payload: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut project = state.store.get_project(project_id).await?;
    let merged = merge(attributes(&project)?, PROJECT.to_internal(payload, true));
    let input = PROJECT.decode::<ProjectInput>(merged)?.validate(project.kind)?;
    check_users_exist(state, &input.users).await?;

    project.name = input.name;
    project.description = input.description;
    project.guideline = input.guideline;
    project.users = input.users;
    project.project_type = input.project_type;
    project.image = input.project_type.image().to_string();
    project.randomize_document_order = input.randomize_document_order;
    project.collaborative_annotation = input.collaborative_annotation;

    let project = state.store.save_project(&project).await?;
    tracing::debug!(project_id, "updated project");
    read(state, ctx, &project).await
}

use serde::Deserialize;
use serde_json::{Map, Value};

use super::fields::{Field, Shape};
use crate::{
    db::{
        models::{attributes, NewRoleMapping, Role, RoleMapping},
        Store,
    },
    error::{AppError, Result},
};

pub static ROLE: Shape = Shape {
    resource_type: "Role",
    fields: &[Field::new("id").read_only(), Field::new("name")],
};

pub static ROLE_MAPPING: Shape = Shape {
    resource_type: "RoleMapping",
    fields: &[
        Field::new("id").read_only(),
        Field::new("user"),
        Field::new("role"),
        Field::new("username").read_only(),
        Field::new("rolename").read_only(),
    ],
};

#[derive(Debug, Deserialize)]
struct RoleInput {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RoleMappingInput {
    user: i64,
    role: i64,
}

pub fn read(role: &Role) -> Result<Map<String, Value>> {
    Ok(ROLE.to_representation(&attributes(role)?))
}

pub async fn create(store: &dyn Store, payload: &Map<String, Value>) -> Result<Map<String, Value>> {
    let input: RoleInput = ROLE.decode(ROLE.to_internal(payload, false))?;
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name: This field may not be blank.".to_string()));
    }

    let role = store.create_role(name).await?;
    read(&role)
}

/// Represents a mapping with the referenced user and role names resolved.
pub async fn read_mapping(store: &dyn Store, mapping: &RoleMapping) -> Result<Map<String, Value>> {
    let username = store
        .find_user(mapping.user_id)
        .await?
        .map_or(Value::Null, |user| Value::String(user.username));
    let rolename = store
        .find_role(mapping.role_id)
        .await?
        .map_or(Value::Null, |role| Value::String(role.name));

    let mut attrs = attributes(mapping)?;
    attrs.insert("username".to_string(), username);
    attrs.insert("rolename".to_string(), rolename);
    Ok(ROLE_MAPPING.to_representation(&attrs))
}

/// Gives a user a role in `project_id`. A user holds at most one role per
/// project.
pub async fn create_mapping(
    store: &dyn Store,
    project_id: i64,
    payload: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let project = store.get_project(project_id).await?;
    let input: RoleMappingInput = ROLE_MAPPING.decode(ROLE_MAPPING.to_internal(payload, false))?;

    if store.find_user(input.user).await?.is_none() {
        return Err(AppError::Validation(format!(
            "user: Invalid pk \"{}\" - object does not exist.",
            input.user
        )));
    }
    if store.find_role(input.role).await?.is_none() {
        return Err(AppError::Validation(format!(
            "role: Invalid pk \"{}\" - object does not exist.",
            input.role
        )));
    }
    if store.find_role_mapping(project.id, input.user).await?.is_some() {
        return Err(AppError::Validation(
            "This user already has a role in this project.".to_string(),
        ));
    }

    let mapping = store
        .create_role_mapping(NewRoleMapping {
            project_id: project.id,
            user_id: input.user,
            role_id: input.role,
        })
        .await?;
    read_mapping(store, &mapping).await
}

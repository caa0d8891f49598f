use serde_json::{Map, Value};

use super::fields::{Field, Shape};
use crate::{
    db::models::{attributes, User},
    error::Result,
};

pub static USER: Shape = Shape {
    resource_type: "User",
    fields: &[
        Field::new("id").read_only(),
        Field::new("username").read_only(),
        Field::new("first_name").read_only(),
        Field::new("last_name").read_only(),
        Field::new("email").read_only(),
        Field::new("is_superuser").read_only(),
    ],
};

pub fn read(user: &User) -> Result<Map<String, Value>> {
    Ok(USER.to_representation(&attributes(user)?))
}

//! Declarative field mapping between internal attributes and the external
//! representation.
//!
//! A [`Shape`] lists the fields one record type exposes. Each [`Field`]
//! names its external key, the internal attribute it is sourced from, and
//! whether it is readable, writable, or both.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Key carrying the concrete record type on polymorphic representations.
pub const RESOURCE_TYPE: &str = "resourcetype";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub source: &'static str,
    pub access: Access,
    pub default: Option<fn() -> Value>,
}

impl Field {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            source: name,
            access: Access::ReadWrite,
            default: None,
        }
    }

    pub const fn source(self, source: &'static str) -> Self {
        Self { source, ..self }
    }

    pub const fn read_only(self) -> Self {
        Self {
            access: Access::ReadOnly,
            ..self
        }
    }

    pub const fn write_only(self) -> Self {
        Self {
            access: Access::WriteOnly,
            ..self
        }
    }

    /// Used when the attribute is missing or null, on read and on write.
    pub const fn default(self, default: fn() -> Value) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }

    pub fn is_readable(&self) -> bool {
        self.access != Access::WriteOnly
    }

    pub fn is_writable(&self) -> bool {
        self.access != Access::ReadOnly
    }
}

pub fn false_value() -> Value {
    Value::Bool(false)
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug)]
pub struct Shape {
    pub resource_type: &'static str,
    pub fields: &'static [Field],
}

impl Shape {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Builds the external representation from internal attributes.
    pub fn to_representation(&self, attrs: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for field in self.fields.iter().filter(|f| f.is_readable()) {
            let value = match (attrs.get(field.source), field.default) {
                (Some(Value::Null) | None, Some(default)) => default(),
                (Some(value), _) => value.clone(),
                (None, None) => Value::Null,
            };
            out.insert(field.name.to_string(), value);
        }
        out
    }

    /// Like [`Shape::to_representation`], tagged with the resource type.
    pub fn to_tagged_representation(&self, attrs: &Map<String, Value>) -> Map<String, Value> {
        let mut out = self.to_representation(attrs);
        out.insert(
            RESOURCE_TYPE.to_string(),
            Value::String(self.resource_type.to_string()),
        );
        out
    }

    /// Maps a payload onto internal attribute names.
    ///
    /// Only writable fields are taken; read-only and unknown keys are dropped
    /// silently. Absent fields with a default receive it unless `partial`.
    pub fn to_internal(&self, payload: &Map<String, Value>, partial: bool) -> Map<String, Value> {
        let mut internal = Map::new();
        for field in self.fields.iter().filter(|f| f.is_writable()) {
            match (payload.get(field.name), field.default) {
                (Some(value), _) => {
                    internal.insert(field.source.to_string(), value.clone());
                }
                (None, Some(default)) if !partial => {
                    internal.insert(field.source.to_string(), default());
                }
                (None, _) => {}
            }
        }
        internal
    }

    /// Deserializes internal attributes into a typed input.
    ///
    /// Serde names the internal attributes in its messages; they are
    /// rewritten to the external field names before becoming validation
    /// errors.
    pub fn decode<T: DeserializeOwned>(&self, internal: Map<String, Value>) -> Result<T> {
        serde_json::from_value(Value::Object(internal)).map_err(|e| {
            let mut message = e.to_string();
            for field in self.fields.iter().filter(|f| f.source != f.name) {
                message = message.replace(
                    &format!("`{}`", field.source),
                    &format!("`{}`", field.name),
                );
            }
            AppError::Validation(format!("Invalid payload: {message}"))
        })
    }
}


/// Overlays `changes` on top of `base`, key by key.
pub fn merge(mut base: Map<String, Value>, changes: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in changes {
        base.insert(key, value);
    }
    base
}

/// Reads the `resourcetype` tag from a polymorphic payload.
pub fn resource_type(payload: &Map<String, Value>) -> Result<&str> {
    payload
        .get(RESOURCE_TYPE)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation("resourcetype: This field is required.".to_string()))
}

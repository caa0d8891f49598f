use std::{collections::HashMap, fmt::Display, hash::Hash};

use super::{document, fields::Shape, project};
use crate::{
    db::models::{DocumentKind, ProjectKind},
    error::{AppError, Result},
};

/// Maps a concrete record kind to the shape that represents it.
///
/// Lookups match the kind exactly; there is no fallback to a parent shape.
#[derive(Debug)]
pub struct TypeRegistry<K> {
    family: &'static str,
    shapes: HashMap<K, &'static Shape>,
}

impl<K> TypeRegistry<K>
where
    K: Copy + Eq + Hash + Display,
{
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            shapes: HashMap::new(),
        }
    }

    pub fn register(mut self, kind: K, shape: &'static Shape) -> Self {
        self.shapes.insert(kind, shape);
        self
    }

    pub fn resolve(&self, kind: K) -> Result<&'static Shape> {
        self.shapes.get(&kind).copied().ok_or_else(|| {
            tracing::error!(family = self.family, %kind, "no shape registered for record kind");
            AppError::UnmappedType {
                family: self.family,
                kind: kind.to_string(),
            }
        })
    }

    /// Resolves the shape named by a payload's `resourcetype` tag.
    ///
    /// An unknown tag is the caller's mistake, so it is a validation error
    /// rather than a registry fault.
    pub fn resolve_tag(&self, tag: &str, parse: fn(&str) -> Option<K>) -> Result<(K, &'static Shape)> {
        let kind = parse(tag)
            .ok_or_else(|| AppError::Validation(format!("Invalid resourcetype `{tag}`.")))?;
        Ok((kind, self.resolve(kind)?))
    }
}

/// The dispatch tables for both polymorphic families, built once at startup.
#[derive(Debug)]
pub struct Registries {
    pub documents: TypeRegistry<DocumentKind>,
    pub projects: TypeRegistry<ProjectKind>,
}

impl Registries {
    pub fn standard() -> Self {
        Self {
            documents: TypeRegistry::new("document")
                .register(DocumentKind::Document, &document::DOCUMENT)
                .register(DocumentKind::ConversationItem, &document::CONVERSATION_ITEM),
            projects: TypeRegistry::new("project")
                .register(ProjectKind::Project, &project::PROJECT)
                .register(
                    ProjectKind::TextClassificationProject,
                    &project::TEXT_CLASSIFICATION_PROJECT,
                )
                .register(
                    ProjectKind::SequenceLabelingProject,
                    &project::SEQUENCE_LABELING_PROJECT,
                )
                .register(ProjectKind::Seq2seqProject, &project::SEQ2SEQ_PROJECT)
                .register(
                    ProjectKind::ConversationsProject,
                    &project::CONVERSATIONS_PROJECT,
                ),
        }
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::standard()
    }
}

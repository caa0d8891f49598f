use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Flattens a record into its internal attribute map, keyed by source name.
pub fn attributes<T: Serialize>(record: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AppError::Internal(format!(
            "Record serialized to a non-object value: {other}"
        ))),
        Err(e) => Err(AppError::Internal(format!("Failed to serialize record: {e}"))),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectType {
    DocumentClassification,
    SequenceLabeling,
    Seq2seq,
    Conversations,
}

impl ProjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::DocumentClassification => "DocumentClassification",
            ProjectType::SequenceLabeling => "SequenceLabeling",
            ProjectType::Seq2seq => "Seq2seq",
            ProjectType::Conversations => "Conversations",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DocumentClassification" => Some(ProjectType::DocumentClassification),
            "SequenceLabeling" => Some(ProjectType::SequenceLabeling),
            "Seq2seq" => Some(ProjectType::Seq2seq),
            "Conversations" => Some(ProjectType::Conversations),
            _ => None,
        }
    }

    /// The annotation flavour documents of this project carry.
    pub fn annotation_kind(self) -> AnnotationKind {
        match self {
            ProjectType::DocumentClassification => AnnotationKind::Document,
            ProjectType::SequenceLabeling => AnnotationKind::Sequence,
            ProjectType::Seq2seq => AnnotationKind::Seq2seq,
            ProjectType::Conversations => AnnotationKind::ConversationItem,
        }
    }

    pub fn image(self) -> &'static str {
        match self {
            ProjectType::DocumentClassification => "images/cats/text_classification.jpg",
            ProjectType::SequenceLabeling => "images/cats/sequence_labeling.jpg",
            ProjectType::Seq2seq => "images/cats/seq2seq.jpg",
            ProjectType::Conversations => "images/cats/conversations.jpg",
        }
    }
}

/// Concrete project record type. Each kind is served by its own shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectKind {
    Project,
    TextClassificationProject,
    SequenceLabelingProject,
    Seq2seqProject,
    ConversationsProject,
}

impl ProjectKind {
    pub const ALL: [ProjectKind; 5] = [
        ProjectKind::Project,
        ProjectKind::TextClassificationProject,
        ProjectKind::SequenceLabelingProject,
        ProjectKind::Seq2seqProject,
        ProjectKind::ConversationsProject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectKind::Project => "Project",
            ProjectKind::TextClassificationProject => "TextClassificationProject",
            ProjectKind::SequenceLabelingProject => "SequenceLabelingProject",
            ProjectKind::Seq2seqProject => "Seq2seqProject",
            ProjectKind::ConversationsProject => "ConversationsProject",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub guideline: String,
    pub users: Vec<i64>,
    pub project_type: ProjectType,
    pub image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub randomize_document_order: bool,
    pub collaborative_annotation: bool,
    #[serde(skip)]
    pub kind: ProjectKind,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub kind: ProjectKind,
    pub name: String,
    pub description: String,
    pub guideline: String,
    pub users: Vec<i64>,
    pub project_type: ProjectType,
    pub randomize_document_order: bool,
    pub collaborative_annotation: bool,
    /// Admin role mapping for the creator, written with the project.
    pub admin: Option<ProjectAdmin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectAdmin {
    pub user_id: i64,
    pub role_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Document,
    ConversationItem,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Document, DocumentKind::ConversationItem];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Document => "Document",
            DocumentKind::ConversationItem => "ConversationItem",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    #[serde(rename = "project")]
    pub project_id: i64,
    pub text: String,
    pub meta: Value,
    #[serde(skip)]
    pub annotations_approved_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationItem {
    #[serde(flatten)]
    pub document: Document,
    #[serde(rename = "conversation")]
    pub conversation_id: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub machine_text: String,
    pub text_validated: Option<bool>,
}

/// A document row resolved to its concrete type.
#[derive(Debug, Clone)]
pub enum DocumentRecord {
    Document(Document),
    ConversationItem(ConversationItem),
}

impl DocumentRecord {
    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentRecord::Document(_) => DocumentKind::Document,
            DocumentRecord::ConversationItem(_) => DocumentKind::ConversationItem,
        }
    }

    pub fn document(&self) -> &Document {
        match self {
            DocumentRecord::Document(doc) => doc,
            DocumentRecord::ConversationItem(item) => &item.document,
        }
    }

    pub fn document_mut(&mut self) -> &mut Document {
        match self {
            DocumentRecord::Document(doc) => doc,
            DocumentRecord::ConversationItem(item) => &mut item.document,
        }
    }

    pub fn attributes(&self) -> Result<Map<String, Value>> {
        match self {
            DocumentRecord::Document(doc) => attributes(doc),
            DocumentRecord::ConversationItem(item) => attributes(item),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub project_id: i64,
    pub text: String,
    pub meta: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewConversationItem {
    pub start_time: f64,
    pub end_time: f64,
    pub machine_text: String,
    pub text: String,
    pub text_validated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: i64,
    #[serde(rename = "project")]
    pub project_id: i64,
    pub meta: Value,
    pub audio_url: Option<String>,
    pub audio_file: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw audio attached to a conversation, stored under `name`.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl fmt::Debug for AudioFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioFile")
            .field("name", &self.name)
            .field("bytes", &self.content.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct NewConversation {
    pub project_id: i64,
    pub meta: Value,
    pub audio_url: Option<String>,
    pub audio_file: Option<AudioFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Label {
    pub id: i64,
    #[serde(rename = "project")]
    pub project_id: i64,
    pub text: String,
    pub prefix_key: Option<String>,
    pub suffix_key: Option<String>,
    pub background_color: String,
    pub text_color: String,
}

#[derive(Debug, Clone)]
pub struct NewLabel {
    pub project_id: i64,
    pub text: String,
    pub prefix_key: Option<String>,
    pub suffix_key: Option<String>,
    pub background_color: String,
    pub text_color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Document,
    Sequence,
    Seq2seq,
    ConversationItem,
}

impl AnnotationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::Document => "document",
            AnnotationKind::Sequence => "sequence",
            AnnotationKind::Seq2seq => "seq2seq",
            AnnotationKind::ConversationItem => "conversation_item",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(AnnotationKind::Document),
            "sequence" => Some(AnnotationKind::Sequence),
            "seq2seq" => Some(AnnotationKind::Seq2seq),
            "conversation_item" => Some(AnnotationKind::ConversationItem),
            _ => None,
        }
    }

    pub fn has_label(self) -> bool {
        !matches!(self, AnnotationKind::Seq2seq)
    }

    pub fn has_span(self) -> bool {
        matches!(self, AnnotationKind::Sequence | AnnotationKind::ConversationItem)
    }
}

/// One annotation row. Which optional columns are populated depends on `kind`.
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub id: i64,
    #[serde(skip)]
    pub kind: AnnotationKind,
    pub prob: f64,
    #[serde(rename = "user")]
    pub user_id: i64,
    #[serde(rename = "document")]
    pub document_id: i64,
    pub label: Option<i64>,
    pub start_offset: Option<i64>,
    pub end_offset: Option<i64>,
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub kind: AnnotationKind,
    pub document_id: i64,
    pub user_id: i64,
    pub prob: f64,
    pub label: Option<i64>,
    pub start_offset: Option<i64>,
    pub end_offset: Option<i64>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleMapping {
    pub id: i64,
    #[serde(rename = "project")]
    pub project_id: i64,
    #[serde(rename = "user")]
    pub user_id: i64,
    #[serde(rename = "role")]
    pub role_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewRoleMapping {
    pub project_id: i64,
    pub user_id: i64,
    pub role_id: i64,
}

pub mod models;
mod sqlite;

use std::time::Duration;

use axum::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::Result;
use models::{
    Annotation, AnnotationKind, Conversation, ConversationItem, DocumentRecord, Label, NewAnnotation,
    NewConversation, NewConversationItem, NewDocument, NewLabel, NewProject, NewRoleMapping, NewUser,
    Project, Role, RoleMapping, User,
};

/// The persisted-object store the serializers read from and write to.
///
/// `get_*` methods fail with `AppError::NotFound` on a miss; `find_*`
/// methods return `None` instead.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn find_user(&self, id: i64) -> Result<Option<User>>;

    async fn create_project(&self, project: NewProject) -> Result<Project>;
    async fn get_project(&self, id: i64) -> Result<Project>;
    async fn save_project(&self, project: &Project) -> Result<Project>;

    async fn create_document(&self, document: NewDocument) -> Result<DocumentRecord>;
    async fn get_document(&self, id: i64) -> Result<DocumentRecord>;
    async fn save_document(&self, record: &DocumentRecord) -> Result<DocumentRecord>;

    /// Creates the conversation and all of its items, or nothing at all.
    async fn create_conversation(
        &self,
        conversation: NewConversation,
        items: Vec<NewConversationItem>,
    ) -> Result<(Conversation, Vec<ConversationItem>)>;
    async fn list_conversations(&self, project_id: i64) -> Result<Vec<Conversation>>;
    async fn find_conversation_audio(&self, conversation_id: i64) -> Result<Option<Vec<u8>>>;

    async fn create_label(&self, label: NewLabel) -> Result<Label>;
    async fn get_label(&self, id: i64) -> Result<Label>;
    async fn find_label(&self, id: i64) -> Result<Option<Label>>;
    async fn save_label(&self, label: &Label) -> Result<Label>;
    /// Whether another label in the project already uses this key pair.
    async fn shortcut_taken(
        &self,
        project_id: i64,
        prefix_key: Option<&str>,
        suffix_key: Option<&str>,
        exclude_label: Option<i64>,
    ) -> Result<bool>;

    async fn create_annotation(&self, annotation: NewAnnotation) -> Result<Annotation>;
    async fn document_annotations(
        &self,
        kind: AnnotationKind,
        document_id: i64,
        user_id: Option<i64>,
    ) -> Result<Vec<Annotation>>;

    async fn create_role(&self, name: &str) -> Result<Role>;
    async fn find_role(&self, id: i64) -> Result<Option<Role>>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;
    async fn create_role_mapping(&self, mapping: NewRoleMapping) -> Result<RoleMapping>;
    async fn find_role_mapping(&self, project_id: i64, user_id: i64) -> Result<Option<RoleMapping>>;
    async fn has_role_mappings(&self) -> Result<bool>;
    async fn role_name_for(&self, project_id: i64, user_id: i64) -> Result<Option<String>>;
}

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        // Ensure the data directory exists
        if let Some(path) = url.strip_prefix("sqlite:") {
            let path = path.split('?').next().unwrap_or(path);
            if !path.starts_with(':') {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let mut options = SqlitePoolOptions::new().max_connections(5);
        if url.contains(":memory:") {
            // An in-memory database lives and dies with its connection.
            options = options
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        let pool = options.connect(url).await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

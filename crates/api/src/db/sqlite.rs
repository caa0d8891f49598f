use axum::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Sqlite, Transaction};

use super::{
    models::{
        Annotation, AnnotationKind, Conversation, ConversationItem, Document, DocumentRecord, Label,
        NewAnnotation, NewConversation, NewConversationItem, NewDocument, NewLabel, NewProject,
        NewRoleMapping, NewUser, Project, ProjectKind, ProjectType, Role, RoleMapping, User,
    },
    Database, Store,
};
use crate::error::{AppError, Result};

type ProjectRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    bool,
    bool,
    String,
    String,
);

type DocumentRow = (
    i64,
    i64,
    String,
    String,
    Option<i64>,
    String,
    String,
    Option<i64>,
    Option<f64>,
    Option<f64>,
    Option<String>,
    Option<bool>,
);

type LabelRow = (i64, i64, String, Option<String>, Option<String>, String, String);

type AnnotationRow = (
    i64,
    String,
    f64,
    i64,
    i64,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<String>,
);

const DOCUMENT_SELECT: &str = r#"
    SELECT d.id, d.project_id, d.text, d.meta, d.annotations_approved_by, d.created_at, d.updated_at,
           ci.conversation_id, ci.start_time, ci.end_time, ci.machine_text, ci.text_validated
    FROM documents d
    LEFT JOIN conversation_items ci ON ci.document_id = d.id
"#;

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("Invalid timestamp `{raw}`: {e}")))
}

fn parse_meta(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| AppError::Internal(format!("Invalid meta JSON: {e}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

fn project_from_row(row: ProjectRow, users: Vec<i64>) -> Result<Project> {
    let (
        id,
        resource_type,
        name,
        description,
        guideline,
        project_type,
        image,
        randomize_document_order,
        collaborative_annotation,
        created_at,
        updated_at,
    ) = row;

    let kind = ProjectKind::parse(&resource_type)
        .ok_or_else(|| AppError::Internal(format!("Unknown project resource type `{resource_type}`")))?;
    let project_type = ProjectType::parse(&project_type)
        .ok_or_else(|| AppError::Internal(format!("Unknown project type `{project_type}`")))?;

    Ok(Project {
        id,
        name,
        description,
        guideline,
        users,
        project_type,
        image,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
        randomize_document_order,
        collaborative_annotation,
        kind,
    })
}

fn document_from_row(row: DocumentRow) -> Result<DocumentRecord> {
    let (
        id,
        project_id,
        text,
        meta,
        annotations_approved_by,
        created_at,
        updated_at,
        conversation_id,
        start_time,
        end_time,
        machine_text,
        text_validated,
    ) = row;

    let document = Document {
        id,
        project_id,
        text,
        meta: parse_meta(&meta)?,
        annotations_approved_by,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    };

    Ok(match conversation_id {
        Some(conversation_id) => DocumentRecord::ConversationItem(ConversationItem {
            document,
            conversation_id,
            start_time: start_time.unwrap_or_default(),
            end_time: end_time.unwrap_or_default(),
            machine_text: machine_text.unwrap_or_default(),
            text_validated,
        }),
        None => DocumentRecord::Document(document),
    })
}

fn label_from_row(row: LabelRow) -> Label {
    let (id, project_id, text, prefix_key, suffix_key, background_color, text_color) = row;
    Label {
        id,
        project_id,
        text,
        prefix_key,
        suffix_key,
        background_color,
        text_color,
    }
}

fn annotation_from_row(row: AnnotationRow) -> Result<Annotation> {
    let (id, kind, prob, user_id, document_id, label, start_offset, end_offset, text) = row;
    let kind = AnnotationKind::parse(&kind)
        .ok_or_else(|| AppError::Internal(format!("Unknown annotation kind `{kind}`")))?;
    Ok(Annotation {
        id,
        kind,
        prob,
        user_id,
        document_id,
        label,
        start_offset,
        end_offset,
        text,
    })
}

async fn insert_project_users(
    tx: &mut Transaction<'_, Sqlite>,
    project_id: i64,
    users: &[i64],
) -> Result<()> {
    for user_id in users {
        sqlx::query("INSERT OR IGNORE INTO project_users (project_id, user_id) VALUES (?, ?)")
            .bind(project_id)
            .bind(*user_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Store for Database {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (username, first_name, last_name, email, is_superuser) VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.is_superuser)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Validation("A user with that username already exists.".to_string())
            } else {
                e.into()
            }
        })?;

        Ok(User {
            id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            is_superuser: user.is_superuser,
        })
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, (i64, String, String, String, String, bool)>(
            "SELECT id, username, first_name, last_name, email, is_superuser FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(
            |(id, username, first_name, last_name, email, is_superuser)| User {
                id,
                username,
                first_name,
                last_name,
                email,
                is_superuser,
            },
        );

        Ok(user)
    }

    async fn create_project(&self, project: NewProject) -> Result<Project> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO projects (resource_type, name, description, guideline, project_type, image,
                                  randomize_document_order, collaborative_annotation, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(project.kind.as_str())
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.guideline)
        .bind(project.project_type.as_str())
        .bind(project.project_type.image())
        .bind(project.randomize_document_order)
        .bind(project.collaborative_annotation)
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        insert_project_users(&mut tx, id, &project.users).await?;
        if let Some(admin) = project.admin {
            sqlx::query("INSERT INTO role_mappings (project_id, user_id, role_id) VALUES (?, ?, ?)")
                .bind(id)
                .bind(admin.user_id)
                .bind(admin.role_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(project_id = id, kind = %project.kind, "created project");
        self.get_project(id).await
    }

    async fn get_project(&self, id: i64) -> Result<Project> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, resource_type, name, description, guideline, project_type, image,
                   randomize_document_order, collaborative_annotation, created_at, updated_at
            FROM projects
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

        let users = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM project_users WHERE project_id = ? ORDER BY user_id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        project_from_row(row, users)
    }

    async fn save_project(&self, project: &Project) -> Result<Project> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE projects
            SET name = ?, description = ?, guideline = ?, project_type = ?, image = ?,
                randomize_document_order = ?, collaborative_annotation = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.guideline)
        .bind(project.project_type.as_str())
        .bind(&project.image)
        .bind(project.randomize_document_order)
        .bind(project.collaborative_annotation)
        .bind(&now)
        .bind(project.id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Project not found".to_string()));
        }

        sqlx::query("DELETE FROM project_users WHERE project_id = ?")
            .bind(project.id)
            .execute(&mut *tx)
            .await?;
        insert_project_users(&mut tx, project.id, &project.users).await?;
        tx.commit().await?;

        self.get_project(project.id).await
    }

    async fn create_document(&self, document: NewDocument) -> Result<DocumentRecord> {
        let now = Utc::now().to_rfc3339();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO documents (project_id, text, meta, created_at, updated_at) VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(document.project_id)
        .bind(&document.text)
        .bind(document.meta.to_string())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        self.get_document(id).await
    }

    async fn get_document(&self, id: i64) -> Result<DocumentRecord> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!("{DOCUMENT_SELECT} WHERE d.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

        document_from_row(row)
    }

    async fn save_document(&self, record: &DocumentRecord) -> Result<DocumentRecord> {
        let now = Utc::now().to_rfc3339();
        let document = record.document();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE documents SET text = ?, meta = ?, annotations_approved_by = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&document.text)
        .bind(document.meta.to_string())
        .bind(document.annotations_approved_by)
        .bind(&now)
        .bind(document.id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Document not found".to_string()));
        }

        if let DocumentRecord::ConversationItem(item) = record {
            sqlx::query(
                r#"
                UPDATE conversation_items
                SET start_time = ?, end_time = ?, machine_text = ?, text_validated = ?
                WHERE document_id = ?
                "#,
            )
            .bind(item.start_time)
            .bind(item.end_time)
            .bind(&item.machine_text)
            .bind(item.text_validated)
            .bind(document.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get_document(document.id).await
    }

    async fn create_conversation(
        &self,
        conversation: NewConversation,
        items: Vec<NewConversationItem>,
    ) -> Result<(Conversation, Vec<ConversationItem>)> {
        let now = Utc::now();
        let stamp = now.to_rfc3339();
        let (audio_name, audio_bytes) = match &conversation.audio_file {
            Some(file) => (Some(file.name.as_str()), Some(file.content.as_slice())),
            None => (None, None),
        };

        // Dropping the transaction on any error below rolls back the parent too.
        let mut tx = self.pool.begin().await?;

        let conversation_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO conversations (project_id, meta, audio_url, audio_file_name, audio_file, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(conversation.project_id)
        .bind(conversation.meta.to_string())
        .bind(conversation.audio_url.as_deref())
        .bind(audio_name)
        .bind(audio_bytes)
        .bind(&stamp)
        .fetch_one(&mut *tx)
        .await?;

        let mut created = Vec::with_capacity(items.len());
        for (position, item) in items.into_iter().enumerate() {
            let document_id = sqlx::query_scalar::<_, i64>(
                "INSERT INTO documents (project_id, text, meta, created_at, updated_at) VALUES (?, ?, '{}', ?, ?) RETURNING id",
            )
            .bind(conversation.project_id)
            .bind(&item.text)
            .bind(&stamp)
            .bind(&stamp)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO conversation_items (document_id, conversation_id, position, start_time, end_time,
                                                machine_text, text_validated)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(document_id)
            .bind(conversation_id)
            .bind(position as i64)
            .bind(item.start_time)
            .bind(item.end_time)
            .bind(&item.machine_text)
            .bind(item.text_validated)
            .execute(&mut *tx)
            .await?;

            created.push(ConversationItem {
                document: Document {
                    id: document_id,
                    project_id: conversation.project_id,
                    text: item.text,
                    meta: Value::Object(Default::default()),
                    annotations_approved_by: None,
                    created_at: now,
                    updated_at: now,
                },
                conversation_id,
                start_time: item.start_time,
                end_time: item.end_time,
                machine_text: item.machine_text,
                text_validated: Some(item.text_validated),
            });
        }

        tx.commit().await?;
        tracing::info!(
            conversation_id,
            project_id = conversation.project_id,
            items = created.len(),
            "created conversation"
        );

        let audio_file = conversation.audio_file.map(|file| file.name);
        Ok((
            Conversation {
                id: conversation_id,
                project_id: conversation.project_id,
                meta: conversation.meta,
                audio_url: conversation.audio_url,
                audio_file,
                created_at: now,
            },
            created,
        ))
    }

    async fn list_conversations(&self, project_id: i64) -> Result<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, (i64, i64, String, Option<String>, Option<String>, String)>(
            r#"
            SELECT id, project_id, meta, audio_url, audio_file_name, created_at
            FROM conversations
            WHERE project_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, project_id, meta, audio_url, audio_file, created_at)| {
                Ok(Conversation {
                    id,
                    project_id,
                    meta: parse_meta(&meta)?,
                    audio_url,
                    audio_file,
                    created_at: parse_time(&created_at)?,
                })
            })
            .collect()
    }

    async fn find_conversation_audio(&self, conversation_id: i64) -> Result<Option<Vec<u8>>> {
        let audio = sqlx::query_scalar::<_, Option<Vec<u8>>>(
            "SELECT audio_file FROM conversations WHERE id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(audio.flatten())
    }

    async fn create_label(&self, label: NewLabel) -> Result<Label> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO labels (project_id, text, prefix_key, suffix_key, background_color, text_color)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(label.project_id)
        .bind(&label.text)
        .bind(label.prefix_key.as_deref())
        .bind(label.suffix_key.as_deref())
        .bind(&label.background_color)
        .bind(&label.text_color)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(label_id = id, project_id = label.project_id, "created label");
        Ok(Label {
            id,
            project_id: label.project_id,
            text: label.text,
            prefix_key: label.prefix_key,
            suffix_key: label.suffix_key,
            background_color: label.background_color,
            text_color: label.text_color,
        })
    }

    async fn get_label(&self, id: i64) -> Result<Label> {
        self.find_label(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Label not found".to_string()))
    }

    async fn find_label(&self, id: i64) -> Result<Option<Label>> {
        let label = sqlx::query_as::<_, LabelRow>(
            "SELECT id, project_id, text, prefix_key, suffix_key, background_color, text_color FROM labels WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(label_from_row);

        Ok(label)
    }

    async fn save_label(&self, label: &Label) -> Result<Label> {
        let updated = sqlx::query(
            r#"
            UPDATE labels
            SET text = ?, prefix_key = ?, suffix_key = ?, background_color = ?, text_color = ?
            WHERE id = ?
            "#,
        )
        .bind(&label.text)
        .bind(label.prefix_key.as_deref())
        .bind(label.suffix_key.as_deref())
        .bind(&label.background_color)
        .bind(&label.text_color)
        .bind(label.id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Label not found".to_string()));
        }
        self.get_label(label.id).await
    }

    async fn shortcut_taken(
        &self,
        project_id: i64,
        prefix_key: Option<&str>,
        suffix_key: Option<&str>,
        exclude_label: Option<i64>,
    ) -> Result<bool> {
        // `IS` compares NULLs as equal, matching "no prefix" against "no prefix".
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM labels
            WHERE project_id = ? AND prefix_key IS ? AND suffix_key IS ?
              AND (? IS NULL OR id != ?)
            "#,
        )
        .bind(project_id)
        .bind(prefix_key)
        .bind(suffix_key)
        .bind(exclude_label)
        .bind(exclude_label)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn create_annotation(&self, annotation: NewAnnotation) -> Result<Annotation> {
        let now = Utc::now().to_rfc3339();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO annotations (kind, document_id, user_id, prob, label_id, start_offset, end_offset, text, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(annotation.kind.as_str())
        .bind(annotation.document_id)
        .bind(annotation.user_id)
        .bind(annotation.prob)
        .bind(annotation.label)
        .bind(annotation.start_offset)
        .bind(annotation.end_offset)
        .bind(annotation.text.as_deref())
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Annotation {
            id,
            kind: annotation.kind,
            prob: annotation.prob,
            user_id: annotation.user_id,
            document_id: annotation.document_id,
            label: annotation.label,
            start_offset: annotation.start_offset,
            end_offset: annotation.end_offset,
            text: annotation.text,
        })
    }

    async fn document_annotations(
        &self,
        kind: AnnotationKind,
        document_id: i64,
        user_id: Option<i64>,
    ) -> Result<Vec<Annotation>> {
        let rows = sqlx::query_as::<_, AnnotationRow>(
            r#"
            SELECT id, kind, prob, user_id, document_id, label_id, start_offset, end_offset, text
            FROM annotations
            WHERE kind = ? AND document_id = ? AND (? IS NULL OR user_id = ?)
            ORDER BY id ASC
            "#,
        )
        .bind(kind.as_str())
        .bind(document_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(annotation_from_row).collect()
    }

    async fn create_role(&self, name: &str) -> Result<Role> {
        let id = sqlx::query_scalar::<_, i64>("INSERT INTO roles (name) VALUES (?) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Validation("role with this name already exists.".to_string())
                } else {
                    e.into()
                }
            })?;

        Ok(Role {
            id,
            name: name.to_string(),
        })
    }

    async fn find_role(&self, id: i64) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM roles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|(id, name)| Role { id, name });

        Ok(role)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(|(id, name)| Role { id, name });

        Ok(role)
    }

    async fn create_role_mapping(&self, mapping: NewRoleMapping) -> Result<RoleMapping> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO role_mappings (project_id, user_id, role_id) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(mapping.project_id)
        .bind(mapping.user_id)
        .bind(mapping.role_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Validation("This user already has a role in this project.".to_string())
            } else {
                e.into()
            }
        })?;

        tracing::info!(
            role_mapping_id = id,
            project_id = mapping.project_id,
            user_id = mapping.user_id,
            "assigned project role"
        );
        Ok(RoleMapping {
            id,
            project_id: mapping.project_id,
            user_id: mapping.user_id,
            role_id: mapping.role_id,
        })
    }

    async fn find_role_mapping(&self, project_id: i64, user_id: i64) -> Result<Option<RoleMapping>> {
        let mapping = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            "SELECT id, project_id, user_id, role_id FROM role_mappings WHERE project_id = ? AND user_id = ?",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|(id, project_id, user_id, role_id)| RoleMapping {
            id,
            project_id,
            user_id,
            role_id,
        });

        Ok(mapping)
    }

    async fn has_role_mappings(&self) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM role_mappings)")
            .fetch_one(&self.pool)
            .await?;

        Ok(exists != 0)
    }

    async fn role_name_for(&self, project_id: i64, user_id: i64) -> Result<Option<String>> {
        let name = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.name
            FROM role_mappings rm
            JOIN roles r ON r.id = rm.role_id
            WHERE rm.project_id = ? AND rm.user_id = ?
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(name)
    }
}

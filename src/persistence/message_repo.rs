//! Message repository: inbound intake, outbound queue, and dedup lookups.

use std::sync::Arc;

use chrono::Utc;

use crate::models::message::{Direction, Message, NewMessage};
use crate::{AppError, Result};

use super::db::Database;

/// Repository for message records.
#[derive(Clone)]
pub struct MessageRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    project_id: Option<i64>,
    direction: String,
    sender: String,
    recipient: String,
    subject: String,
    body: String,
    processed: i64,
    correlation_id: Option<String>,
    in_reply_to: Option<String>,
    thread_id: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let direction = Direction::parse(&self.direction)
            .ok_or_else(|| AppError::Db(format!("invalid direction: {}", self.direction)))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        Ok(Message {
            id: self.id,
            project_id: self.project_id,
            direction,
            sender: self.sender,
            recipient: self.recipient,
            subject: self.subject,
            body: self.body,
            processed: self.processed != 0,
            correlation_id: self.correlation_id,
            in_reply_to: self.in_reply_to,
            thread_id: self.thread_id,
            created_at,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, project_id, direction, sender, recipient, subject, body, \
     processed, correlation_id, in_reply_to, thread_id, created_at";

impl MessageRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a message and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert(&self, new: &NewMessage) -> Result<Message> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO messages (project_id, direction, sender, recipient, subject, body,
                 correlation_id, in_reply_to, thread_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(new.project_id)
        .bind(new.direction.as_str())
        .bind(&new.sender)
        .bind(&new.recipient)
        .bind(&new.subject)
        .bind(&new.body)
        .bind(&new.correlation_id)
        .bind(&new.in_reply_to)
        .bind(&new.thread_id)
        .bind(&now)
        .execute(self.db.as_ref())
        .await?;

        self.get(result.last_insert_rowid()).await
    }

    /// Fetch a message by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when missing, `AppError::Db` on failure.
    pub async fn get(&self, id: i64) -> Result<Message> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"))
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;
        row.ok_or_else(|| AppError::NotFound(format!("message {id}")))?
            .into_message()
    }

    /// Whether a message with this external correlation id was already stored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn correlation_seen(&self, correlation_id: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE correlation_id = ?1")
                .bind(correlation_id)
                .fetch_one(self.db.as_ref())
                .await?;
        Ok(count > 0)
    }

    /// Whether an inbound message in `thread_id` with an identical body
    /// fingerprint already exists. Used when the channel supplies no stable
    /// per-message id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn thread_body_seen(&self, thread_id: &str, body: &str) -> Result<bool> {
        let fingerprint = Message::body_fingerprint(body);
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE thread_id = ?1 AND direction = 'inbound'"
        ))
        .bind(thread_id)
        .fetch_all(self.db.as_ref())
        .await?;
        for row in rows {
            let message = row.into_message()?;
            if Message::body_fingerprint(&message.body) == fingerprint {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Unprocessed inbound messages linked to `project_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn unprocessed_inbound(&self, project_id: i64) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE project_id = ?1 AND direction = 'inbound' AND processed = 0
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(project_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Undelivered outbound messages across all projects, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn pending_outbound(&self, limit: i64) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE direction = 'outbound' AND processed = 0
             ORDER BY created_at ASC, id ASC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Full conversation for a project, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn conversation(&self, project_id: i64) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE project_id = ?1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(project_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Mark a message processed (inbound: consumed; outbound: delivered).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_processed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE messages SET processed = 1 WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Link a message to a project after thread resolution.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn link_project(&self, id: i64, project_id: i64) -> Result<()> {
        sqlx::query("UPDATE messages SET project_id = ?1 WHERE id = ?2")
            .bind(project_id)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// The most recent outbound message for a project, if any. Used to
    /// thread replies.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn last_outbound(&self, project_id: i64) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE project_id = ?1 AND direction = 'outbound'
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(project_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(MessageRow::into_message).transpose()
    }

    /// Resolve the project that owns the outbound message `correlation_id`
    /// refers to. Used to link inbound replies via `In-Reply-To`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn project_for_correlation(&self, correlation_id: &str) -> Result<Option<i64>> {
        let project_id: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT project_id FROM messages WHERE correlation_id = ?1
             ORDER BY id DESC LIMIT 1",
        )
        .bind(correlation_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        Ok(project_id.flatten())
    }
}

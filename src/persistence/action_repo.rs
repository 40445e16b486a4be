//! Action-log repository.

use std::sync::Arc;

use chrono::Utc;

use crate::models::action::{ActionLogEntry, ActionRecord};
use crate::{AppError, Result};

use super::db::Database;

/// Repository for action-log records.
#[derive(Clone)]
pub struct ActionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ActionRow {
    id: i64,
    stage: String,
    project_id: Option<i64>,
    action: String,
    success: i64,
    error: Option<String>,
    input: Option<String>,
    output: Option<String>,
    duration_ms: Option<i64>,
    tokens_used: Option<i64>,
    created_at: String,
}

impl ActionRow {
    fn into_entry(self) -> Result<ActionLogEntry> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let decode = |raw: Option<String>| -> Result<Option<serde_json::Value>> {
            raw.as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| AppError::Db(format!("invalid json column: {e}")))
        };
        Ok(ActionLogEntry {
            id: self.id,
            stage: self.stage,
            project_id: self.project_id,
            action: self.action,
            success: self.success != 0,
            error: self.error,
            input: decode(self.input)?,
            output: decode(self.output)?,
            duration_ms: self.duration_ms,
            tokens_used: self.tokens_used,
            created_at,
        })
    }
}

impl ActionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append an action record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn record(&self, record: &ActionRecord) -> Result<()> {
        let encode = |value: &Option<serde_json::Value>| -> Result<Option<String>> {
            value
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| AppError::Db(format!("json column encode: {e}")))
        };
        sqlx::query(
            "INSERT INTO action_log (stage, project_id, action, success, error, input,
                 output, duration_ms, tokens_used, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&record.stage)
        .bind(record.project_id)
        .bind(&record.action)
        .bind(i64::from(record.success))
        .bind(&record.error)
        .bind(encode(&record.input)?)
        .bind(encode(&record.output)?)
        .bind(record.duration_ms)
        .bind(record.tokens_used)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Action history for a project, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn for_project(&self, project_id: i64) -> Result<Vec<ActionLogEntry>> {
        let rows: Vec<ActionRow> = sqlx::query_as(
            "SELECT id, stage, project_id, action, success, error, input, output,
                 duration_ms, tokens_used, created_at
             FROM action_log WHERE project_id = ?1 ORDER BY id ASC",
        )
        .bind(project_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(ActionRow::into_entry).collect()
    }
}

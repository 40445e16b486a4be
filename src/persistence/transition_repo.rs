//! Read access to the transition audit trail. Writes happen inside
//! `ProjectRepo::transition` so the log and the state column cannot drift.

use std::sync::Arc;

use chrono::Utc;

use crate::models::project::ProjectState;
use crate::models::transition::{TransitionActor, TransitionLogEntry};
use crate::{AppError, Result};

use super::db::Database;

/// Repository for transition-log records.
#[derive(Clone)]
pub struct TransitionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct TransitionRow {
    id: i64,
    project_id: i64,
    from_state: String,
    to_state: String,
    actor: String,
    reason: String,
    metadata: Option<String>,
    created_at: String,
}

impl TransitionRow {
    fn into_entry(self) -> Result<TransitionLogEntry> {
        let from_state = parse_state(&self.from_state)?;
        let to_state = parse_state(&self.to_state)?;
        let actor = TransitionActor::parse(&self.actor)
            .ok_or_else(|| AppError::Db(format!("invalid actor: {}", self.actor)))?;
        let metadata = match self.metadata.as_deref() {
            Some(raw) => Some(
                serde_json::from_str(raw)
                    .map_err(|e| AppError::Db(format!("invalid metadata: {e}")))?,
            ),
            None => None,
        };
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        Ok(TransitionLogEntry {
            id: self.id,
            project_id: self.project_id,
            from_state,
            to_state,
            actor,
            reason: self.reason,
            metadata,
            created_at,
        })
    }
}

fn parse_state(s: &str) -> Result<ProjectState> {
    ProjectState::parse(s).ok_or_else(|| AppError::Db(format!("invalid state: {s}")))
}

impl TransitionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Full transition history for a project, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn for_project(&self, project_id: i64) -> Result<Vec<TransitionLogEntry>> {
        let rows: Vec<TransitionRow> = sqlx::query_as(
            "SELECT id, project_id, from_state, to_state, actor, reason, metadata, created_at
             FROM transition_log WHERE project_id = ?1 ORDER BY id ASC",
        )
        .bind(project_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(TransitionRow::into_entry).collect()
    }
}

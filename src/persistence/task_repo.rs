//! Task repository for estimation work breakdowns.

use std::sync::Arc;

use chrono::Utc;

use crate::models::task::{NewTask, Task, TaskStatus};
use crate::{AppError, Result};

use super::db::Database;

/// Repository for task records.
#[derive(Clone)]
pub struct TaskRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    project_id: i64,
    title: String,
    description: Option<String>,
    estimated_hours: Option<f64>,
    sort_order: i64,
    status: String,
    created_at: String,
}

impl TaskRow {
    fn into_task(self) -> Result<Task> {
        let status = TaskStatus::parse(&self.status)
            .ok_or_else(|| AppError::Db(format!("invalid task status: {}", self.status)))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        Ok(Task {
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            estimated_hours: self.estimated_hours,
            sort_order: self.sort_order,
            status,
            created_at,
        })
    }
}

impl TaskRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Replace the breakdown for a project: existing tasks are deleted and
    /// the new set inserted in order. Re-estimation is idempotent this way.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any statement fails.
    pub async fn replace_breakdown(&self, project_id: i64, tasks: &[NewTask]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM tasks WHERE project_id = ?1")
            .bind(project_id)
            .execute(tx.as_mut())
            .await?;
        for task in tasks {
            sqlx::query(
                "INSERT INTO tasks (project_id, title, description, estimated_hours,
                     sort_order, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
            )
            .bind(project_id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.estimated_hours)
            .bind(task.sort_order)
            .bind(&now)
            .execute(tx.as_mut())
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Fetch the breakdown for a project, in sort order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn for_project(&self, project_id: i64) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, project_id, title, description, estimated_hours, sort_order,
                 status, created_at
             FROM tasks WHERE project_id = ?1 ORDER BY sort_order ASC, id ASC",
        )
        .bind(project_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

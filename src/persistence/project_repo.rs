//! Project repository: CRUD, allow-listed field updates, and the guarded
//! state transition primitive.

use std::sync::Arc;

use chrono::Utc;

use crate::machine;
use crate::models::project::{
    Complexity, NewProject, Project, ProjectState, ProjectUpdate, SourceChannel,
};
use crate::models::transition::TransitionActor;
use crate::{AppError, Result};

use super::db::Database;

/// Repository for project records.
#[derive(Clone)]
pub struct ProjectRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: i64,
    client_id: Option<i64>,
    client_email: String,
    title: String,
    description: String,
    category: Option<String>,
    complexity: Option<String>,
    tech_stack: String,
    familiar_stack: Option<i64>,
    budget_min: Option<f64>,
    budget_max: Option<f64>,
    estimated_hours: Option<f64>,
    quoted_price: Option<f64>,
    final_price: Option<f64>,
    scam_score: Option<f64>,
    is_scam: i64,
    is_illegal: i64,
    rejection_reason: Option<String>,
    current_state: String,
    source: String,
    source_url: Option<String>,
    source_message_id: Option<String>,
    analysis: Option<String>,
    created_at: String,
    updated_at: String,
}

const PROJECT_COLUMNS: &str = "id, client_id, client_email, title, description, category, \
     complexity, tech_stack, familiar_stack, budget_min, budget_max, estimated_hours, \
     quoted_price, final_price, scam_score, is_scam, is_illegal, rejection_reason, \
     current_state, source, source_url, source_message_id, analysis, created_at, updated_at";

impl ProjectRow {
    fn into_project(self) -> Result<Project> {
        let current_state = parse_state(&self.current_state)?;
        let source = SourceChannel::parse(&self.source)
            .ok_or_else(|| AppError::Db(format!("invalid source: {}", self.source)))?;
        let complexity = match self.complexity.as_deref() {
            Some(raw) => Some(
                Complexity::parse(raw)
                    .ok_or_else(|| AppError::Db(format!("invalid complexity: {raw}")))?,
            ),
            None => None,
        };
        let tech_stack: Vec<String> = serde_json::from_str(&self.tech_stack)
            .map_err(|e| AppError::Db(format!("invalid tech_stack: {e}")))?;
        let analysis = match self.analysis.as_deref() {
            Some(raw) => Some(
                serde_json::from_str(raw)
                    .map_err(|e| AppError::Db(format!("invalid analysis: {e}")))?,
            ),
            None => None,
        };

        Ok(Project {
            id: self.id,
            client_id: self.client_id,
            client_email: self.client_email,
            title: self.title,
            description: self.description,
            category: self.category,
            complexity,
            tech_stack,
            familiar_stack: self.familiar_stack.map(|v| v != 0),
            budget_min: self.budget_min,
            budget_max: self.budget_max,
            estimated_hours: self.estimated_hours,
            quoted_price: self.quoted_price,
            final_price: self.final_price,
            scam_score: self.scam_score,
            is_scam: self.is_scam != 0,
            is_illegal: self.is_illegal != 0,
            rejection_reason: self.rejection_reason,
            current_state,
            source,
            source_url: self.source_url,
            source_message_id: self.source_message_id,
            analysis,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_state(s: &str) -> Result<ProjectState> {
    ProjectState::parse(s).ok_or_else(|| AppError::Db(format!("invalid project state: {s}")))
}

fn parse_timestamp(s: &str) -> Result<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid timestamp: {e}")))
}

impl ProjectRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new project and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, new: &NewProject) -> Result<Project> {
        let now = Utc::now().to_rfc3339();
        let tech_stack = serde_json::to_string(&new.tech_stack)
            .map_err(|e| AppError::Db(format!("tech_stack encode: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO projects (client_id, client_email, title, description, category,
                 tech_stack, budget_min, budget_max, current_state, source, source_url,
                 source_message_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        )
        .bind(new.client_id)
        .bind(&new.client_email)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.category)
        .bind(&tech_stack)
        .bind(new.budget_min)
        .bind(new.budget_max)
        .bind(new.state.as_str())
        .bind(new.source.as_str())
        .bind(&new.source_url)
        .bind(&new.source_message_id)
        .bind(&now)
        .execute(self.db.as_ref())
        .await?;

        self.get(result.last_insert_rowid()).await
    }

    /// Fetch a project by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when missing, `AppError::Db` on failure.
    pub async fn get(&self, id: i64) -> Result<Project> {
        let row: Option<ProjectRow> =
            sqlx::query_as(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"))
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;
        row.ok_or_else(|| AppError::NotFound(format!("project {id}")))?
            .into_project()
    }

    /// Fetch projects in `state`, oldest first, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_state(&self, state: ProjectState, limit: i64) -> Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE current_state = ?1 ORDER BY created_at ASC, id ASC LIMIT ?2"
        ))
        .bind(state.as_str())
        .bind(limit)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(ProjectRow::into_project).collect()
    }

    /// Fetch the project created from the external message `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_source_message_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE source_message_id = ?1"
        ))
        .bind(correlation_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(ProjectRow::into_project).transpose()
    }

    /// Fetch the project tracking the external listing `source_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_source_url(&self, source_url: &str) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE source_url = ?1"
        ))
        .bind(source_url)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(ProjectRow::into_project).transpose()
    }

    /// Most recently updated non-terminal project for `client_email`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn latest_active_by_email(&self, client_email: &str) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE client_email = ?1 AND current_state NOT IN ('closed', 'rejected')
             ORDER BY updated_at DESC, id DESC LIMIT 1"
        ))
        .bind(client_email)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(ProjectRow::into_project).transpose()
    }

    /// Apply allow-listed field updates. State is not expressible here; use
    /// [`ProjectRepo::transition`] for state changes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any update fails.
    pub async fn update_fields(&self, id: i64, updates: &[ProjectUpdate]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for update in updates {
            apply_update(&mut tx, id, update).await?;
        }
        sqlx::query("UPDATE projects SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(tx.as_mut())
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Move a project from `from` to `to`, appending a transition-log entry.
    ///
    /// The update is conditional on `current_state` still being `from`;
    /// returns `Ok(false)` when the precondition no longer holds (a
    /// concurrent actor moved the project first), in which case nothing is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` when `from` is terminal, and
    /// `AppError::Db` on persistence failure.
    pub async fn transition(
        &self,
        id: i64,
        from: ProjectState,
        to: ProjectState,
        actor: TransitionActor,
        reason: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<bool> {
        if machine::is_terminal(from) {
            return Err(AppError::InvalidTransition(format!(
                "project {id}: {from} is terminal"
            )));
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;
        let result = sqlx::query(
            "UPDATE projects SET current_state = ?1, updated_at = ?2
             WHERE id = ?3 AND current_state = ?4",
        )
        .bind(to.as_str())
        .bind(&now)
        .bind(id)
        .bind(from.as_str())
        .execute(tx.as_mut())
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let metadata_text = metadata
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Db(format!("metadata encode: {e}")))?;
        sqlx::query(
            "INSERT INTO transition_log (project_id, from_state, to_state, actor, reason,
                 metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(actor.as_str())
        .bind(reason)
        .bind(&metadata_text)
        .bind(&now)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

async fn apply_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: i64,
    update: &ProjectUpdate,
) -> Result<()> {
    match update {
        ProjectUpdate::Title(v) => set_text(tx, id, "title", v).await,
        ProjectUpdate::Description(v) => set_text(tx, id, "description", v).await,
        ProjectUpdate::Category(v) => set_text(tx, id, "category", v).await,
        ProjectUpdate::Complexity(v) => set_text(tx, id, "complexity", v.as_str()).await,
        ProjectUpdate::TechStack(v) => {
            let encoded = serde_json::to_string(v)
                .map_err(|e| AppError::Db(format!("tech_stack encode: {e}")))?;
            set_text(tx, id, "tech_stack", &encoded).await
        }
        ProjectUpdate::FamiliarStack(v) => set_int(tx, id, "familiar_stack", i64::from(*v)).await,
        ProjectUpdate::BudgetMin(v) => set_real(tx, id, "budget_min", *v).await,
        ProjectUpdate::BudgetMax(v) => set_real(tx, id, "budget_max", *v).await,
        ProjectUpdate::EstimatedHours(v) => set_real(tx, id, "estimated_hours", *v).await,
        ProjectUpdate::QuotedPrice(v) => set_real(tx, id, "quoted_price", *v).await,
        ProjectUpdate::FinalPrice(v) => set_real(tx, id, "final_price", *v).await,
        ProjectUpdate::ScamScore(v) => set_real(tx, id, "scam_score", *v).await,
        ProjectUpdate::IsScam(v) => set_int(tx, id, "is_scam", i64::from(*v)).await,
        ProjectUpdate::IsIllegal(v) => set_int(tx, id, "is_illegal", i64::from(*v)).await,
        ProjectUpdate::RejectionReason(v) => set_text(tx, id, "rejection_reason", v).await,
        ProjectUpdate::Analysis(v) => {
            let encoded = serde_json::to_string(v)
                .map_err(|e| AppError::Db(format!("analysis encode: {e}")))?;
            set_text(tx, id, "analysis", &encoded).await
        }
        ProjectUpdate::ClientId(v) => set_int(tx, id, "client_id", *v).await,
        ProjectUpdate::ClientEmail(v) => set_text(tx, id, "client_email", v).await,
        ProjectUpdate::SourceMessageId(v) => set_text(tx, id, "source_message_id", v).await,
    }
}

async fn set_text(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: i64,
    column: &str,
    value: &str,
) -> Result<()> {
    sqlx::query(&format!("UPDATE projects SET {column} = ?1 WHERE id = ?2"))
        .bind(value)
        .bind(id)
        .execute(tx.as_mut())
        .await?;
    Ok(())
}

async fn set_int(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: i64,
    column: &str,
    value: i64,
) -> Result<()> {
    sqlx::query(&format!("UPDATE projects SET {column} = ?1 WHERE id = ?2"))
        .bind(value)
        .bind(id)
        .execute(tx.as_mut())
        .await?;
    Ok(())
}

async fn set_real(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: i64,
    column: &str,
    value: f64,
) -> Result<()> {
    sqlx::query(&format!("UPDATE projects SET {column} = ?1 WHERE id = ?2"))
        .bind(value)
        .bind(id)
        .execute(tx.as_mut())
        .await?;
    Ok(())
}

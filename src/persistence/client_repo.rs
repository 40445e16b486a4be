//! Client repository keyed by email.

use std::sync::Arc;

use chrono::Utc;

use crate::models::client::Client;
use crate::{AppError, Result};

use super::db::Database;

/// Repository for client records.
#[derive(Clone)]
pub struct ClientRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ClientRow {
    id: i64,
    email: String,
    name: Option<String>,
    company: Option<String>,
    projects_total: i64,
    projects_completed: i64,
    is_blacklisted: i64,
    blacklist_reason: Option<String>,
    created_at: String,
}

impl ClientRow {
    fn into_client(self) -> Result<Client> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        Ok(Client {
            id: self.id,
            email: self.email,
            name: self.name,
            company: self.company,
            projects_total: self.projects_total,
            projects_completed: self.projects_completed,
            is_blacklisted: self.is_blacklisted != 0,
            blacklist_reason: self.blacklist_reason,
            created_at,
        })
    }
}

const CLIENT_COLUMNS: &str = "id, email, name, company, projects_total, projects_completed, \
     is_blacklisted, blacklist_reason, created_at";

impl ClientRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch a client by email.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Client>> {
        let row: Option<ClientRow> = sqlx::query_as(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE email = ?1"
        ))
        .bind(email)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(ClientRow::into_client).transpose()
    }

    /// Fetch the client by email, creating it when missing. The project
    /// counter is bumped on every call since this runs once per new inquiry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn upsert_for_inquiry(&self, email: &str, name: Option<&str>) -> Result<Client> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO clients (email, name, projects_total, created_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(email) DO UPDATE SET
                 projects_total = projects_total + 1,
                 name = COALESCE(clients.name, excluded.name)",
        )
        .bind(email)
        .bind(name)
        .bind(&now)
        .execute(self.db.as_ref())
        .await?;

        self.find_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("client {email}")))
    }

    /// Mark a client blacklisted with a reason.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn blacklist(&self, email: &str, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE clients SET is_blacklisted = 1, blacklist_reason = ?1 WHERE email = ?2",
        )
        .bind(reason)
        .bind(email)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Bump the completed-projects counter when a deal closes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn record_completion(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE clients SET projects_completed = projects_completed + 1 WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }
}

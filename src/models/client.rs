//! Client entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A counterparty across one or more projects, keyed by email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client {
    /// Row identifier.
    pub id: i64,
    /// Unique contact email.
    pub email: String,
    /// Display name, when known.
    pub name: Option<String>,
    /// Company name, when known.
    pub company: Option<String>,
    /// Projects ever opened with this client.
    pub projects_total: i64,
    /// Projects that reached `Closed`.
    pub projects_completed: i64,
    /// Blocked from the pipeline entirely.
    pub is_blacklisted: bool,
    /// Why the client was blacklisted.
    pub blacklist_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

//! Task entity: estimation work breakdown items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution status of a breakdown task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    Pending,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// Stable string form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// One work item produced by the estimation stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Row identifier.
    pub id: i64,
    /// Owning project.
    pub project_id: i64,
    /// Short task title.
    pub title: String,
    /// Longer task description.
    pub description: Option<String>,
    /// Estimated effort in hours.
    pub estimated_hours: Option<f64>,
    /// Position within the breakdown.
    pub sort_order: i64,
    /// Execution status.
    pub status: TaskStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Insertable task record.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Short task title.
    pub title: String,
    /// Longer task description.
    pub description: Option<String>,
    /// Estimated effort in hours.
    pub estimated_hours: Option<f64>,
    /// Position within the breakdown.
    pub sort_order: i64,
}

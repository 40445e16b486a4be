//! Transition-log entity: the audit trail of every state change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::project::ProjectState;

/// Actor that caused a state transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionActor {
    /// A pipeline stage handler.
    Stage,
    /// An inbound adapter reacting to an external event.
    External,
    /// A human operator.
    Operator,
}

impl TransitionActor {
    /// Stable string form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::External => "external",
            Self::Operator => "operator",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stage" => Some(Self::Stage),
            "external" => Some(Self::External),
            "operator" => Some(Self::Operator),
            _ => None,
        }
    }
}

/// One appended state change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionLogEntry {
    /// Row identifier.
    pub id: i64,
    /// Project the transition belongs to.
    pub project_id: i64,
    /// State before the change.
    pub from_state: ProjectState,
    /// State after the change.
    pub to_state: ProjectState,
    /// Who caused the change.
    pub actor: TransitionActor,
    /// Human-readable reason.
    pub reason: String,
    /// Optional structured context.
    pub metadata: Option<serde_json::Value>,
    /// Transition timestamp.
    pub created_at: DateTime<Utc>,
}

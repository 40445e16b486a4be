//! Action-log entity: per-stage execution records for observability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded stage or adapter action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionLogEntry {
    /// Row identifier.
    pub id: i64,
    /// Stage or component name.
    pub stage: String,
    /// Project the action ran against, when applicable.
    pub project_id: Option<i64>,
    /// Short action name.
    pub action: String,
    /// Whether the action succeeded.
    pub success: bool,
    /// Error text on failure.
    pub error: Option<String>,
    /// Structured input snapshot.
    pub input: Option<serde_json::Value>,
    /// Structured output snapshot.
    pub output: Option<serde_json::Value>,
    /// Wall-clock duration.
    pub duration_ms: Option<i64>,
    /// AI tokens consumed, when the action called a model.
    pub tokens_used: Option<i64>,
    /// Record timestamp.
    pub created_at: DateTime<Utc>,
}

/// Insertable action record built up with the `with_*` methods.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    /// Stage or component name.
    pub stage: String,
    /// Project the action ran against.
    pub project_id: Option<i64>,
    /// Short action name.
    pub action: String,
    /// Whether the action succeeded.
    pub success: bool,
    /// Error text on failure.
    pub error: Option<String>,
    /// Structured input snapshot.
    pub input: Option<serde_json::Value>,
    /// Structured output snapshot.
    pub output: Option<serde_json::Value>,
    /// Wall-clock duration.
    pub duration_ms: Option<i64>,
    /// AI tokens consumed.
    pub tokens_used: Option<i64>,
}

impl ActionRecord {
    /// A successful action.
    #[must_use]
    pub fn ok(stage: &str, action: &str) -> Self {
        Self {
            stage: stage.to_string(),
            project_id: None,
            action: action.to_string(),
            success: true,
            error: None,
            input: None,
            output: None,
            duration_ms: None,
            tokens_used: None,
        }
    }

    /// A failed action with its error text.
    #[must_use]
    pub fn failed(stage: &str, action: &str, error: &str) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::ok(stage, action)
        }
    }

    /// Attach the project the action ran against.
    #[must_use]
    pub fn for_project(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Attach a structured output snapshot.
    #[must_use]
    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Attach a structured input snapshot.
    #[must_use]
    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }

    /// Attach wall-clock duration.
    #[must_use]
    pub fn with_duration_ms(mut self, ms: i64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Attach AI token usage.
    #[must_use]
    pub fn with_tokens(mut self, tokens: i64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }
}

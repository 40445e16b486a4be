//! Idempotent schema bootstrap. Every statement is `IF NOT EXISTS` so the
//! application can re-apply the schema on each start.

use crate::Result;

use super::db::Database;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS clients (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        name TEXT,
        company TEXT,
        projects_total INTEGER NOT NULL DEFAULT 0,
        projects_completed INTEGER NOT NULL DEFAULT 0,
        is_blacklisted INTEGER NOT NULL DEFAULT 0,
        blacklist_reason TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        client_id INTEGER REFERENCES clients(id),
        client_email TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        category TEXT,
        complexity TEXT,
        tech_stack TEXT NOT NULL DEFAULT '[]',
        familiar_stack INTEGER,
        budget_min REAL,
        budget_max REAL,
        estimated_hours REAL,
        quoted_price REAL,
        final_price REAL,
        scam_score REAL,
        is_scam INTEGER NOT NULL DEFAULT 0,
        is_illegal INTEGER NOT NULL DEFAULT 0,
        rejection_reason TEXT,
        current_state TEXT NOT NULL,
        source TEXT NOT NULL,
        source_url TEXT,
        source_message_id TEXT,
        analysis TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_projects_state ON projects(current_state)",
    "CREATE INDEX IF NOT EXISTS idx_projects_client_email ON projects(client_email)",
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER REFERENCES projects(id),
        direction TEXT NOT NULL,
        sender TEXT NOT NULL,
        recipient TEXT NOT NULL,
        subject TEXT NOT NULL DEFAULT '',
        body TEXT NOT NULL,
        processed INTEGER NOT NULL DEFAULT 0,
        correlation_id TEXT,
        in_reply_to TEXT,
        thread_id TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_pending
        ON messages(direction, processed)",
    "CREATE INDEX IF NOT EXISTS idx_messages_correlation
        ON messages(correlation_id)",
    "CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id)",
    "CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        title TEXT NOT NULL,
        description TEXT,
        estimated_hours REAL,
        sort_order INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id)",
    "CREATE TABLE IF NOT EXISTS transition_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        from_state TEXT NOT NULL,
        to_state TEXT NOT NULL,
        actor TEXT NOT NULL,
        reason TEXT NOT NULL,
        metadata TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_transition_project
        ON transition_log(project_id)",
    "CREATE TABLE IF NOT EXISTS action_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        stage TEXT NOT NULL,
        project_id INTEGER,
        action TEXT NOT NULL,
        success INTEGER NOT NULL,
        error TEXT,
        input TEXT,
        output TEXT,
        duration_ms INTEGER,
        tokens_used INTEGER,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_action_project ON action_log(project_id)",
    "CREATE TABLE IF NOT EXISTS system_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        value_type TEXT NOT NULL,
        description TEXT,
        updated_at TEXT NOT NULL
    )",
];

/// Apply all schema statements.
///
/// # Errors
///
/// Returns `AppError::Db` if any statement fails.
pub async fn apply_schema(db: &Database) -> Result<()> {
    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

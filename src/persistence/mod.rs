//! `SQLite` persistence: connection bootstrap, schema, and repositories.

pub mod action_repo;
pub mod client_repo;
pub mod db;
pub mod message_repo;
pub mod project_repo;
pub mod schema;
pub mod settings_repo;
pub mod task_repo;
pub mod transition_repo;

pub use action_repo::ActionRepo;
pub use client_repo::ClientRepo;
pub use db::{connect, connect_memory, Database};
pub use message_repo::MessageRepo;
pub use project_repo::ProjectRepo;
pub use settings_repo::SettingsRepo;
pub use task_repo::TaskRepo;
pub use transition_repo::TransitionRepo;

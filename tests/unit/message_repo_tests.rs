//! Unit tests for `MessageRepo`: queue behavior and duplicate suppression.

use std::sync::Arc;

use dealflow::models::message::{Direction, NewMessage};
use dealflow::models::project::NewProject;
use dealflow::persistence::{db, Database, MessageRepo, ProjectRepo};

fn inbound(sender: &str, body: &str, correlation_id: Option<&str>) -> NewMessage {
    NewMessage::inbound(
        sender.to_string(),
        "me@example.com".to_string(),
        "Hello".to_string(),
        body.to_string(),
        correlation_id.map(str::to_string),
    )
}

async fn seed_project(pool: &Arc<Database>, email: &str) -> i64 {
    let new = NewProject::email_inquiry(
        "Inventory API".to_string(),
        "API build".to_string(),
        email.to_string(),
        None,
        None,
    );
    ProjectRepo::new(Arc::clone(pool))
        .create(&new)
        .await
        .expect("create project")
        .id
}

#[tokio::test]
async fn insert_persists_all_fields() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let repo = MessageRepo::new(pool);

    let stored = repo
        .insert(&inbound("client@example.com", "hi there", Some("<m1>")))
        .await
        .expect("insert");
    assert_eq!(stored.direction, Direction::Inbound);
    assert_eq!(stored.sender, "client@example.com");
    assert_eq!(stored.correlation_id, Some("<m1>".to_string()));
    assert!(!stored.processed);
}

#[tokio::test]
async fn outbound_messages_get_a_correlation_id() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let project_id = seed_project(&pool, "client@example.com").await;
    let repo = MessageRepo::new(pool);

    let message = NewMessage::outbound(
        project_id,
        "me@example.com".to_string(),
        "client@example.com".to_string(),
        "Proposal".to_string(),
        "offer text".to_string(),
    );
    let stored = repo.insert(&message).await.expect("insert");
    assert!(stored.correlation_id.is_some());
    assert_eq!(stored.direction, Direction::Outbound);
}

#[tokio::test]
async fn correlation_seen_detects_duplicates() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let repo = MessageRepo::new(pool);

    assert!(!repo.correlation_seen("<m2>").await.expect("query"));
    repo.insert(&inbound("a@example.com", "body", Some("<m2>")))
        .await
        .expect("insert");
    assert!(repo.correlation_seen("<m2>").await.expect("query"));
}

#[tokio::test]
async fn thread_body_fingerprint_suppresses_duplicates() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let repo = MessageRepo::new(pool);

    let mut message = inbound("handle", "can you start monday?", None);
    message.thread_id = Some("t-1".to_string());
    repo.insert(&message).await.expect("insert");

    // identical body modulo surrounding whitespace
    assert!(repo
        .thread_body_seen("t-1", "  can you start monday?\n")
        .await
        .expect("query"));
    assert!(!repo
        .thread_body_seen("t-1", "different message")
        .await
        .expect("query"));
    // other threads are not consulted
    assert!(!repo
        .thread_body_seen("t-2", "can you start monday?")
        .await
        .expect("query"));
}

#[tokio::test]
async fn pending_outbound_is_fifo_and_excludes_processed() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let project_id = seed_project(&pool, "a@example.com").await;
    let repo = MessageRepo::new(pool);

    let first = repo
        .insert(&NewMessage::outbound(
            project_id,
            "me@example.com".to_string(),
            "a@example.com".to_string(),
            "one".to_string(),
            "first".to_string(),
        ))
        .await
        .expect("insert");
    let second = repo
        .insert(&NewMessage::outbound(
            project_id,
            "me@example.com".to_string(),
            "a@example.com".to_string(),
            "two".to_string(),
            "second".to_string(),
        ))
        .await
        .expect("insert");

    let pending = repo.pending_outbound(10).await.expect("fetch");
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, first.id);
    assert_eq!(pending[1].id, second.id);

    repo.mark_processed(first.id).await.expect("mark");
    let pending = repo.pending_outbound(10).await.expect("fetch");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);
}

#[tokio::test]
async fn unprocessed_inbound_is_scoped_to_the_project() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let mine_id = seed_project(&pool, "a@example.com").await;
    let other_id = seed_project(&pool, "b@example.com").await;
    let repo = MessageRepo::new(pool);

    let mut mine = inbound("a@example.com", "for the first project", None);
    mine.project_id = Some(mine_id);
    repo.insert(&mine).await.expect("insert");

    let mut other = inbound("b@example.com", "for the second project", None);
    other.project_id = Some(other_id);
    repo.insert(&other).await.expect("insert");

    let pending = repo.unprocessed_inbound(mine_id).await.expect("fetch");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].body, "for the first project");
}

#[tokio::test]
async fn project_for_correlation_resolves_linked_sends() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let project_id = seed_project(&pool, "a@example.com").await;
    let repo = MessageRepo::new(pool);

    let stored = repo
        .insert(&NewMessage::outbound(
            project_id,
            "me@example.com".to_string(),
            "a@example.com".to_string(),
            "offer".to_string(),
            "text".to_string(),
        ))
        .await
        .expect("insert");
    let correlation = stored.correlation_id.expect("correlation id");

    let linked = repo
        .project_for_correlation(&correlation)
        .await
        .expect("lookup");
    assert_eq!(linked, Some(project_id));
    assert_eq!(
        repo.project_for_correlation("<unknown>").await.expect("lookup"),
        None
    );
}

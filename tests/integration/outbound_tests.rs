//! Outbound drain: delivery, ordering, and failure handling.

use std::sync::Arc;

use dealflow::models::message::NewMessage;
use dealflow::models::project::{NewProject, ProjectState};
use dealflow::pipeline::OutboundDrain;
use dealflow::services::MailTransport;

use super::support::{CapturingTransport, FailingTransport, ScriptedAi, TestEnv};

fn drain(env: &TestEnv, transport: Arc<dyn MailTransport>) -> OutboundDrain {
    OutboundDrain::new(
        env.ctx.messages.clone(),
        env.ctx.actions.clone(),
        transport,
        env.ctx.config.clone(),
    )
}

async fn seed_project(env: &TestEnv) -> i64 {
    let new = NewProject::email_inquiry(
        "Inventory API".to_string(),
        "API build".to_string(),
        "sam@example.com".to_string(),
        None,
        Some("<inq>".to_string()),
    );
    env.ctx.projects.create(&new).await.expect("create").id
}

async fn queue_message(env: &TestEnv, project_id: i64, subject: &str) {
    env.ctx
        .messages
        .insert(&NewMessage::outbound(
            project_id,
            "work@biz.example".to_string(),
            "sam@example.com".to_string(),
            subject.to_string(),
            "body".to_string(),
        ))
        .await
        .expect("insert");
}

#[tokio::test]
async fn queued_messages_deliver_oldest_first() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let project_id = seed_project(&env).await;
    queue_message(&env, project_id, "first").await;
    queue_message(&env, project_id, "second").await;

    let transport = Arc::new(CapturingTransport::new());
    let outbound = drain(&env, Arc::clone(&transport) as Arc<dyn MailTransport>);
    assert_eq!(outbound.drain().await.expect("drain"), 2);

    let sent = transport.sent.lock().expect("poisoned");
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].subject, "first");
    assert_eq!(sent[1].subject, "second");
    assert_eq!(sent[0].to, "sam@example.com");
    // each delivery carries its correlation id for reply threading
    assert!(sent[0].correlation_id.is_some());
    drop(sent);

    assert!(env.ctx.messages.pending_outbound(10).await.expect("queue").is_empty());
    // a second run has nothing to do
    assert_eq!(outbound.drain().await.expect("drain"), 0);
}

#[tokio::test]
async fn failed_delivery_stays_queued_and_is_logged() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let project_id = seed_project(&env).await;
    queue_message(&env, project_id, "proposal").await;

    let outbound = drain(&env, Arc::new(FailingTransport));
    assert_eq!(outbound.drain().await.expect("drain"), 0);

    // still queued for the next run
    assert_eq!(env.ctx.messages.pending_outbound(10).await.expect("queue").len(), 1);
    let actions = env.ctx.actions.for_project(project_id).await.expect("actions");
    let failure = actions.last().expect("logged failure");
    assert!(!failure.success);
    assert_eq!(failure.stage, "outbound");
    assert!(failure.error.as_deref().is_some_and(|e| e.contains("smtp")));
}

#[tokio::test]
async fn recovered_transport_delivers_the_backlog() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let project_id = seed_project(&env).await;
    queue_message(&env, project_id, "proposal").await;

    let failing = drain(&env, Arc::new(FailingTransport));
    assert_eq!(failing.drain().await.expect("drain"), 0);

    let transport = Arc::new(CapturingTransport::new());
    let recovered = drain(&env, Arc::clone(&transport) as Arc<dyn MailTransport>);
    assert_eq!(recovered.drain().await.expect("drain"), 1);
    assert_eq!(transport.sent_count(), 1);
    assert!(env.ctx.messages.pending_outbound(10).await.expect("queue").is_empty());
}

#[tokio::test]
async fn recipient_less_messages_are_retired_without_sending() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let project_id = seed_project(&env).await;
    env.ctx
        .messages
        .insert(&NewMessage::outbound(
            project_id,
            "work@biz.example".to_string(),
            String::new(),
            "orphaned".to_string(),
            "body".to_string(),
        ))
        .await
        .expect("insert");

    let transport = Arc::new(CapturingTransport::new());
    let outbound = drain(&env, Arc::clone(&transport) as Arc<dyn MailTransport>);
    assert_eq!(outbound.drain().await.expect("drain"), 0);

    assert_eq!(transport.sent_count(), 0);
    // retired, not left for the next run
    assert!(env.ctx.messages.pending_outbound(10).await.expect("queue").is_empty());
}

#[tokio::test]
async fn projects_stay_untouched_by_delivery() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let project_id = seed_project(&env).await;
    queue_message(&env, project_id, "proposal").await;

    let transport = Arc::new(CapturingTransport::new());
    let outbound = drain(&env, Arc::clone(&transport) as Arc<dyn MailTransport>);
    outbound.drain().await.expect("drain");

    // delivery is transport-only, project state moves elsewhere
    assert_eq!(
        env.ctx.projects.get(project_id).await.expect("get").current_state,
        ProjectState::New
    );
}

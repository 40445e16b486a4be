//! Negotiation outcomes: acceptance, decline, counter rounds, escalation.

use std::sync::Arc;

use dealflow::models::message::NewMessage;
use dealflow::models::project::{NewProject, ProjectState, ProjectUpdate, SourceChannel};
use dealflow::models::setting::SettingValue;
use dealflow::persistence::settings_repo::KEY_MAX_NEGOTIATION_ROUNDS;

use super::support::{needles, ScriptedAi, TestEnv};

async fn seed_negotiation(env: &TestEnv) -> i64 {
    let new = NewProject {
        title: "Inventory API".to_string(),
        description: "REST API build".to_string(),
        client_email: "sam@example.com".to_string(),
        client_id: None,
        source: SourceChannel::Email,
        source_url: None,
        source_message_id: Some("<inq-neg>".to_string()),
        state: ProjectState::Negotiation,
        budget_min: None,
        budget_max: None,
        tech_stack: Vec::new(),
        category: None,
    };
    let project = env.ctx.projects.create(&new).await.expect("create");
    env.ctx
        .projects
        .update_fields(project.id, &[ProjectUpdate::QuotedPrice(1000.0)])
        .await
        .expect("price");
    project.id
}

async fn push_client_message(env: &TestEnv, project_id: i64, body: &str, correlation: &str) {
    let mut message = NewMessage::inbound(
        "sam@example.com".to_string(),
        String::new(),
        "Re: Inventory API".to_string(),
        body.to_string(),
        Some(correlation.to_string()),
    );
    message.project_id = Some(project_id);
    env.ctx.messages.insert(&message).await.expect("insert");
}

#[tokio::test]
async fn acceptance_moves_to_agreed_with_final_price() {
    let ai = ScriptedAi::new().respond(
        needles::NEGOTIATE,
        r#"{"intent": "accept", "reply": "Great, I will send the invoice.",
            "agreed_price": 950}"#,
    );
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    let project_id = seed_negotiation(&env).await;
    push_client_message(&env, project_id, "Deal, 950 works for us.", "<neg-1>").await;

    let orchestrator = env.orchestrator();
    env.run_to_quiescence(&orchestrator).await;

    let settled = env.ctx.projects.get(project_id).await.expect("get");
    assert_eq!(settled.current_state, ProjectState::Agreed);
    assert_eq!(settled.final_price, Some(950.0));
    assert!(env.notifier.contains("AgreementReached"));

    // confirmation reply queued, inbound consumed
    assert_eq!(env.ctx.messages.pending_outbound(10).await.expect("queue").len(), 1);
    assert!(env
        .ctx
        .messages
        .unprocessed_inbound(project_id)
        .await
        .expect("pending")
        .is_empty());
}

#[tokio::test]
async fn decline_moves_to_rejected() {
    let ai = ScriptedAi::new().respond(
        needles::NEGOTIATE,
        r#"{"intent": "decline", "reply": "Understood, all the best.",
            "agreed_price": null}"#,
    );
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    let project_id = seed_negotiation(&env).await;
    push_client_message(&env, project_id, "We went with someone cheaper.", "<neg-2>").await;

    let orchestrator = env.orchestrator();
    env.run_to_quiescence(&orchestrator).await;

    let settled = env.ctx.projects.get(project_id).await.expect("get");
    assert_eq!(settled.current_state, ProjectState::Rejected);
    assert_eq!(
        settled.rejection_reason.as_deref(),
        Some("client declined the offer")
    );
    assert!(env.notifier.contains("ProjectRejected"));
}

#[tokio::test]
async fn counter_offer_stays_and_counts_the_round() {
    let ai = ScriptedAi::new().respond(
        needles::NEGOTIATE,
        r#"{"intent": "counter", "reply": "I can hold the price but add a week of support.",
            "agreed_price": null}"#,
    );
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    let project_id = seed_negotiation(&env).await;
    push_client_message(&env, project_id, "Can you do 700?", "<neg-3>").await;

    let orchestrator = env.orchestrator();
    orchestrator.tick().await.expect("tick");

    let project = env.ctx.projects.get(project_id).await.expect("get");
    assert_eq!(project.current_state, ProjectState::Negotiation);
    let round = project
        .analysis
        .as_ref()
        .and_then(|doc| doc.get("negotiation_round"))
        .and_then(serde_json::Value::as_i64);
    assert_eq!(round, Some(1));
    assert_eq!(env.ctx.messages.pending_outbound(10).await.expect("queue").len(), 1);
}

#[tokio::test]
async fn exhausted_rounds_escalate_once_and_hold() {
    let ai = ScriptedAi::new().respond(
        needles::NEGOTIATE,
        r#"{"intent": "counter", "reply": "noop", "agreed_price": null}"#,
    );
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    env.ctx
        .settings
        .set(KEY_MAX_NEGOTIATION_ROUNDS, &SettingValue::Int(0))
        .await
        .expect("setting");
    let project_id = seed_negotiation(&env).await;
    push_client_message(&env, project_id, "Let's haggle forever.", "<neg-4>").await;

    let orchestrator = env.orchestrator();
    orchestrator.tick().await.expect("tick");
    orchestrator.tick().await.expect("tick");

    let project = env.ctx.projects.get(project_id).await.expect("get");
    assert_eq!(project.current_state, ProjectState::Negotiation);
    assert!(env.notifier.contains("EscalationNeeded"));
    // notified exactly once despite repeated ticks
    assert_eq!(env.notifier.events.lock().expect("poisoned").len(), 1);
    // the client message is left for the operator
    assert_eq!(
        env.ctx
            .messages
            .unprocessed_inbound(project_id)
            .await
            .expect("pending")
            .len(),
        1
    );
}

#[tokio::test]
async fn unusable_reply_keeps_the_message_for_retry() {
    // the backend answers in prose instead of the json envelope
    let ai = ScriptedAi::new().respond(needles::NEGOTIATE, "Let me think about that.");
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    let project_id = seed_negotiation(&env).await;
    push_client_message(&env, project_id, "Can you do 800?", "<neg-5>").await;

    let orchestrator = env.orchestrator();
    orchestrator.tick().await.expect("tick");

    assert_eq!(
        env.ctx.projects.get(project_id).await.expect("get").current_state,
        ProjectState::Negotiation
    );
    // message left unprocessed for the next tick, nothing queued
    assert_eq!(
        env.ctx
            .messages
            .unprocessed_inbound(project_id)
            .await
            .expect("pending")
            .len(),
        1
    );
    assert!(env.ctx.messages.pending_outbound(10).await.expect("queue").is_empty());
}

#[tokio::test]
async fn marketplace_replies_go_through_the_thread() {
    let ai = ScriptedAi::new().respond(
        needles::NEGOTIATE,
        r#"{"intent": "counter", "reply": "I can start Monday at the quoted price.",
            "agreed_price": null}"#,
    );
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    let new = NewProject {
        title: "Scraper build".to_string(),
        description: "Retail price scraper".to_string(),
        client_email: "acmecorp@freelancer.com".to_string(),
        client_id: None,
        source: SourceChannel::Marketplace,
        source_url: Some("https://www.freelancer.com/projects/python/scraper-1".to_string()),
        source_message_id: Some("t9".to_string()),
        state: ProjectState::Negotiation,
        budget_min: None,
        budget_max: None,
        tech_stack: Vec::new(),
        category: None,
    };
    let project = env.ctx.projects.create(&new).await.expect("create");
    env.ctx
        .projects
        .update_fields(project.id, &[ProjectUpdate::QuotedPrice(500.0)])
        .await
        .expect("price");

    let mut message = NewMessage::inbound(
        "AcmeCorp".to_string(),
        String::new(),
        String::new(),
        "When could you start?".to_string(),
        Some("k9".to_string()),
    );
    message.project_id = Some(project.id);
    message.thread_id = Some("t9".to_string());
    env.ctx.messages.insert(&message).await.expect("insert");

    let orchestrator = env.orchestrator();
    orchestrator.tick().await.expect("tick");

    let replies = env.marketplace.replies.lock().expect("poisoned");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, "t9");
    assert!(replies[0].1.contains("Monday"));
    drop(replies);

    // nothing for the mail drain; the transcript still holds our reply
    assert!(env.ctx.messages.pending_outbound(10).await.expect("queue").is_empty());
    assert_eq!(
        env.ctx.messages.conversation(project.id).await.expect("conversation").len(),
        2
    );
}

#[tokio::test]
async fn no_client_message_means_no_action() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let project_id = seed_negotiation(&env).await;

    let orchestrator = env.orchestrator();
    let advanced = orchestrator.tick().await.expect("tick");
    assert_eq!(advanced, 0);
    assert_eq!(
        env.ctx.projects.get(project_id).await.expect("get").current_state,
        ProjectState::Negotiation
    );
}

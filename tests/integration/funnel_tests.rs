//! End-to-end funnel runs over the in-memory store with scripted AI.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use dealflow::machine;
use dealflow::models::project::{NewProject, ProjectState, ProjectUpdate, SourceChannel};

use super::support::{needles, ScriptedAi, TestEnv};

fn inquiry(email: &str) -> NewProject {
    NewProject::email_inquiry(
        "Inventory API".to_string(),
        "We need a REST API for our warehouse, with auth and reporting.".to_string(),
        email.to_string(),
        None,
        Some(format!("<inq-{email}>")),
    )
}

fn happy_path_ai() -> ScriptedAi {
    ScriptedAi::new()
        .respond(
            needles::PARSE,
            r#"{"title": "Inventory API", "description": "REST API with auth and reporting",
                "budget_min": 500, "budget_max": 1000, "tech_stack": ["python"],
                "client_name": "Sam"}"#,
        )
        .respond(
            needles::SCAM,
            r#"{"scam_score": 0.05, "is_illegal": false, "reason": "looks genuine"}"#,
        )
        .respond(
            needles::CLASSIFY,
            r#"{"category": "web_development", "complexity": "small",
                "tech_stack": ["python", "fastapi"], "familiar_stack": true}"#,
        )
        .respond(
            needles::REQUIREMENTS,
            r#"{"clarity_score": 8.5, "summary": "well specified", "questions": []}"#,
        )
        .respond(
            needles::ESTIMATE,
            r#"{"tasks": [{"title": "API scaffolding", "hours": 10},
                          {"title": "Auth and reporting", "hours": 6}],
                "total_hours": 20}"#,
        )
        .respond(needles::OFFER, "Hello Sam, here is my proposal for the API.")
}

#[tokio::test]
async fn email_inquiry_runs_to_offer_sent() {
    let env = TestEnv::with_ai(Arc::new(happy_path_ai())).await;
    let project = env.ctx.projects.create(&inquiry("sam@example.com")).await.expect("create");

    let orchestrator = env.orchestrator();
    env.run_to_quiescence(&orchestrator).await;

    let settled = env.ctx.projects.get(project.id).await.expect("get");
    assert_eq!(settled.current_state, ProjectState::OfferSent);
    assert_eq!(settled.category.as_deref(), Some("web_development"));
    assert_eq!(settled.estimated_hours, Some(20.0));
    // default hourly rate is 50
    assert_eq!(settled.quoted_price, Some(1000.0));
    assert!(settled.client_id.is_some());

    let tasks = env.ctx.tasks.for_project(project.id).await.expect("tasks");
    assert_eq!(tasks.len(), 2);

    // acknowledgement from the requirements pass, then the proposal
    let pending = env.ctx.messages.pending_outbound(10).await.expect("queue");
    assert_eq!(pending.len(), 2);
    assert!(pending[0].subject.starts_with("Re:"));
    assert!(pending[0].body.contains("proposal shortly"));
    assert!(pending[1].subject.starts_with("Proposal:"));
    assert!(pending[1].body.contains("proposal"));

    assert!(env.notifier.contains("OfferQueued"));
}

#[tokio::test]
async fn every_logged_transition_is_a_recognized_edge() {
    let env = TestEnv::with_ai(Arc::new(happy_path_ai())).await;
    let project = env.ctx.projects.create(&inquiry("audit@example.com")).await.expect("create");

    let orchestrator = env.orchestrator();
    env.run_to_quiescence(&orchestrator).await;

    let entries = env.transitions().for_project(project.id).await.expect("log");
    assert!(!entries.is_empty());
    for entry in &entries {
        assert!(
            machine::is_edge(entry.from_state, entry.to_state),
            "unexpected edge {} -> {}",
            entry.from_state,
            entry.to_state
        );
    }
    // the chain is connected: each entry starts where the previous ended
    for pair in entries.windows(2) {
        assert_eq!(pair[0].to_state, pair[1].from_state);
    }
    assert_eq!(entries[0].from_state, ProjectState::New);
    assert_eq!(entries.last().expect("entries").to_state, ProjectState::OfferSent);
}

#[tokio::test]
async fn scam_inquiry_is_rejected_and_logged() {
    let ai = ScriptedAi::new()
        .respond(needles::PARSE, r#"{"title": "Payment processing help"}"#)
        .respond(
            needles::SCAM,
            r#"{"scam_score": 0.95, "is_illegal": false, "reason": "advance fee scheme"}"#,
        );
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    let project = env.ctx.projects.create(&inquiry("shady@example.com")).await.expect("create");

    let orchestrator = env.orchestrator();
    env.run_to_quiescence(&orchestrator).await;

    let settled = env.ctx.projects.get(project.id).await.expect("get");
    assert_eq!(settled.current_state, ProjectState::Rejected);
    assert!(settled.is_scam);
    assert_eq!(settled.rejection_reason.as_deref(), Some("advance fee scheme"));
    assert!(env.notifier.contains("ProjectRejected"));

    let entries = env.transitions().for_project(project.id).await.expect("log");
    assert_eq!(entries.last().expect("entries").to_state, ProjectState::Rejected);
}

#[tokio::test]
async fn score_exactly_at_threshold_rejects() {
    // default threshold is 0.7 and the boundary is inclusive
    let ai = ScriptedAi::new()
        .respond(needles::PARSE, r#"{"title": "Borderline"}"#)
        .respond(
            needles::SCAM,
            r#"{"scam_score": 0.7, "is_illegal": false, "reason": "multiple risk signals"}"#,
        );
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    let project = env.ctx.projects.create(&inquiry("edge@example.com")).await.expect("create");

    let orchestrator = env.orchestrator();
    env.run_to_quiescence(&orchestrator).await;

    let settled = env.ctx.projects.get(project.id).await.expect("get");
    assert_eq!(settled.current_state, ProjectState::Rejected);
}

#[tokio::test]
async fn illegal_request_rejects_and_blacklists_the_client() {
    let ai = ScriptedAi::new()
        .respond(needles::PARSE, r#"{"title": "Account takeover tool"}"#)
        .respond(
            needles::SCAM,
            r#"{"scam_score": 0.2, "is_illegal": true, "reason": "requests unlawful work"}"#,
        );
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    let project = env.ctx.projects.create(&inquiry("crook@example.com")).await.expect("create");

    let orchestrator = env.orchestrator();
    env.run_to_quiescence(&orchestrator).await;

    let settled = env.ctx.projects.get(project.id).await.expect("get");
    assert_eq!(settled.current_state, ProjectState::Rejected);
    assert!(settled.is_illegal);

    let client = env
        .ctx
        .clients
        .find_by_email("crook@example.com")
        .await
        .expect("find")
        .expect("present");
    assert!(client.is_blacklisted);
}

#[tokio::test]
async fn prose_answers_never_strand_the_funnel() {
    // a backend that ignores the json instruction on every stage
    let prose = "Sorry, I can only answer in prose today.";
    let ai = ScriptedAi::new()
        .respond(needles::PARSE, prose)
        .respond(needles::SCAM, prose)
        .respond(needles::CLASSIFY, prose)
        .respond(needles::REQUIREMENTS, prose)
        .respond(needles::ESTIMATE, prose)
        .respond(needles::OFFER, prose);
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    let project = env.ctx.projects.create(&inquiry("prose@example.com")).await.expect("create");

    let orchestrator = env.orchestrator();
    env.run_to_quiescence(&orchestrator).await;

    let settled = env.ctx.projects.get(project.id).await.expect("get");
    assert_eq!(settled.current_state, ProjectState::OfferSent);
    // raw fields survive the unusable parse, later stages use defaults
    assert_eq!(settled.title, "Inventory API");
    assert_eq!(settled.category.as_deref(), Some("other"));
    assert_eq!(settled.estimated_hours, Some(20.0));
    assert_eq!(settled.quoted_price, Some(1000.0));
}

#[tokio::test]
async fn failed_bid_degrades_to_operator_handoff() {
    let ai = ScriptedAi::new().respond(needles::OFFER, "Proposal for the scraper.");
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    env.marketplace.refuse_bids.store(true, Ordering::Relaxed);

    let new = NewProject {
        title: "Retail scraper".to_string(),
        description: "Scrape retail prices".to_string(),
        client_email: String::new(),
        client_id: None,
        source: SourceChannel::Marketplace,
        source_url: Some("https://www.freelancer.com/projects/python/scraper-1".to_string()),
        source_message_id: Some("<digest>".to_string()),
        state: ProjectState::EstimationReady,
        budget_min: None,
        budget_max: None,
        tech_stack: Vec::new(),
        category: None,
    };
    let project = env.ctx.projects.create(&new).await.expect("create");
    env.ctx
        .projects
        .update_fields(
            project.id,
            &[
                ProjectUpdate::EstimatedHours(10.0),
                ProjectUpdate::QuotedPrice(500.0),
            ],
        )
        .await
        .expect("fields");

    let orchestrator = env.orchestrator();
    env.run_to_quiescence(&orchestrator).await;

    let settled = env.ctx.projects.get(project.id).await.expect("get");
    assert_eq!(settled.current_state, ProjectState::OfferSent);
    assert!(env.notifier.contains("EscalationNeeded"));

    // the proposal is preserved for manual submission
    let actions = env.ctx.actions.for_project(project.id).await.expect("actions");
    let failure = actions.iter().find(|a| !a.success).expect("failed bid");
    assert_eq!(failure.action, "place_bid");
    assert!(failure.output.as_ref().is_some_and(|o| o.to_string().contains("Proposal")));

    // nothing queued for the mail drain
    assert!(env.ctx.messages.pending_outbound(10).await.expect("queue").is_empty());
}

#[tokio::test]
async fn failed_estimation_advances_on_defaults() {
    // everything scripted except the estimator
    let ai = ScriptedAi::new()
        .respond(needles::PARSE, r#"{"title": "Inventory API"}"#)
        .respond(
            needles::SCAM,
            r#"{"scam_score": 0.0, "is_illegal": false, "reason": "fine"}"#,
        )
        .respond(
            needles::CLASSIFY,
            r#"{"category": "web_development", "complexity": "small",
                "tech_stack": [], "familiar_stack": true}"#,
        )
        .respond(
            needles::REQUIREMENTS,
            r#"{"clarity_score": 9.0, "summary": "clear", "questions": []}"#,
        )
        .respond(needles::OFFER, "Proposal text.");
    let env = TestEnv::with_ai(Arc::new(ai)).await;
    let project = env.ctx.projects.create(&inquiry("noest@example.com")).await.expect("create");

    let orchestrator = env.orchestrator();
    env.run_to_quiescence(&orchestrator).await;

    let settled = env.ctx.projects.get(project.id).await.expect("get");
    assert_eq!(settled.current_state, ProjectState::OfferSent);
    // config default_hours is 20 at the default rate of 50
    assert_eq!(settled.estimated_hours, Some(20.0));
    assert_eq!(settled.quoted_price, Some(1000.0));
    assert!(env.ctx.tasks.for_project(project.id).await.expect("tasks").is_empty());

    let entries = env.transitions().for_project(project.id).await.expect("log");
    let degraded = entries
        .iter()
        .find(|e| e.to_state == ProjectState::EstimationReady)
        .expect("estimation edge");
    assert!(degraded.reason.contains("defaulted"));
}

//! Mail intake: inquiries, digests, reply linking, and filtering.

use std::sync::Arc;

use dealflow::intake::MailAdapter;
use dealflow::models::message::NewMessage;
use dealflow::models::project::{NewProject, ProjectState, SourceChannel};
use dealflow::models::setting::SettingValue;
use dealflow::persistence::settings_repo::{KEY_MAIL_ALLOWED_DOMAINS, KEY_MAIL_BLOCKED_DOMAINS};
use dealflow::services::{MailTransport, Notifier, RawMail};

use super::support::{CapturingTransport, ScriptedAi, TestEnv};

fn adapter(env: &TestEnv, transport: Arc<CapturingTransport>) -> MailAdapter {
    MailAdapter::new(
        env.ctx.projects.clone(),
        env.ctx.clients.clone(),
        env.ctx.messages.clone(),
        env.ctx.settings.clone(),
        transport as Arc<dyn MailTransport>,
        Arc::clone(&env.notifier) as Arc<dyn Notifier>,
        env.ctx.config.clone(),
    )
    .expect("adapter")
}

fn raw_mail(sender: &str, subject: &str, body: &str, id: &str) -> RawMail {
    RawMail {
        message_id: Some(id.to_string()),
        in_reply_to: Vec::new(),
        sender: sender.to_string(),
        recipient: "work@biz.example".to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
    }
}

const DIGEST: &str = "\
New projects matching your skills\n\
\n\
Build a scraper for retail prices\n\
Budget: $250 - $750\n\
Skills: Python, Scraping\n\
https://www.freelancer.com/projects/python/retail-scraper-11111\n\
\n\
Fix a WordPress checkout bug\n\
Budget: $100\n\
https://www.freelancer.com/projects/php/checkout-bug-22222\n";

#[tokio::test]
async fn fresh_inquiry_creates_a_project() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let transport = Arc::new(CapturingTransport::new());
    let mail = adapter(&env, Arc::clone(&transport));

    transport.push_incoming(raw_mail(
        "sam@example.com",
        "Inventory API",
        "We need a REST API for our warehouse.",
        "<m1>",
    ));
    assert_eq!(mail.poll().await.expect("poll"), 1);

    let projects = env.ctx.projects.find_by_state(ProjectState::New, 10).await.expect("list");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].title, "Inventory API");
    assert_eq!(projects[0].client_email, "sam@example.com");
    assert_eq!(projects[0].source, SourceChannel::Email);
    assert!(env.notifier.contains("NewProject"));

    // the body lives on the project now, nothing left for the stages to consume
    let stored = env.ctx.messages.conversation(projects[0].id).await.expect("conversation");
    assert_eq!(stored.len(), 1);
    assert!(env
        .ctx
        .messages
        .unprocessed_inbound(projects[0].id)
        .await
        .expect("pending")
        .is_empty());
}

#[tokio::test]
async fn redelivered_mail_is_ignored() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let transport = Arc::new(CapturingTransport::new());
    let mail = adapter(&env, Arc::clone(&transport));

    let inquiry = raw_mail("sam@example.com", "Inventory API", "Need an API.", "<m1>");
    transport.push_incoming(inquiry.clone());
    mail.poll().await.expect("poll");
    transport.push_incoming(inquiry);
    mail.poll().await.expect("poll");

    let projects = env.ctx.projects.find_by_state(ProjectState::New, 10).await.expect("list");
    assert_eq!(projects.len(), 1);
}

#[tokio::test]
async fn blocked_domain_never_becomes_a_project() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    env.ctx
        .settings
        .set(
            KEY_MAIL_BLOCKED_DOMAINS,
            &SettingValue::Json(serde_json::json!(["spam.example"])),
        )
        .await
        .expect("setting");
    let transport = Arc::new(CapturingTransport::new());
    let mail = adapter(&env, Arc::clone(&transport));

    transport.push_incoming(raw_mail("bot@spam.example", "Offer", "Buy now.", "<m1>"));
    mail.poll().await.expect("poll");

    assert!(env.ctx.projects.find_by_state(ProjectState::New, 10).await.expect("list").is_empty());
}

#[tokio::test]
async fn allowlist_admits_only_listed_domains() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    env.ctx
        .settings
        .set(
            KEY_MAIL_ALLOWED_DOMAINS,
            &SettingValue::Json(serde_json::json!(["client.example"])),
        )
        .await
        .expect("setting");
    let transport = Arc::new(CapturingTransport::new());
    let mail = adapter(&env, Arc::clone(&transport));

    transport.push_incoming(raw_mail("x@other.example", "Hello", "Work?", "<m1>"));
    transport.push_incoming(raw_mail("y@client.example", "Hello", "Work?", "<m2>"));
    mail.poll().await.expect("poll");

    let projects = env.ctx.projects.find_by_state(ProjectState::New, 10).await.expect("list");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].client_email, "y@client.example");
}

#[tokio::test]
async fn bulk_senders_never_become_projects() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let transport = Arc::new(CapturingTransport::new());
    let mail = adapter(&env, Arc::clone(&transport));

    transport.push_incoming(raw_mail(
        "noreply@client.example",
        "Your invoice",
        "This is an automated message.",
        "<m1>",
    ));
    transport.push_incoming(raw_mail(
        "Mailer-Daemon@client.example",
        "Delivery failure",
        "Could not deliver.",
        "<m2>",
    ));
    mail.poll().await.expect("poll");

    assert!(env.ctx.projects.find_by_state(ProjectState::New, 10).await.expect("list").is_empty());
}

#[tokio::test]
async fn blacklisted_sender_is_dropped() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    env.ctx
        .clients
        .upsert_for_inquiry("crook@example.com", None)
        .await
        .expect("client");
    env.ctx
        .clients
        .blacklist("crook@example.com", "requests unlawful work")
        .await
        .expect("blacklist");
    let transport = Arc::new(CapturingTransport::new());
    let mail = adapter(&env, Arc::clone(&transport));

    transport.push_incoming(raw_mail("crook@example.com", "New job", "Same again.", "<m1>"));
    mail.poll().await.expect("poll");

    assert!(env.ctx.projects.find_by_state(ProjectState::New, 10).await.expect("list").is_empty());
}

#[tokio::test]
async fn own_sends_looping_back_are_ignored() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let transport = Arc::new(CapturingTransport::new());
    let mut config = env.ctx.config.clone();
    config.mail.from_address = "work@biz.example".to_string();
    let mail = MailAdapter::new(
        env.ctx.projects.clone(),
        env.ctx.clients.clone(),
        env.ctx.messages.clone(),
        env.ctx.settings.clone(),
        Arc::clone(&transport) as Arc<dyn MailTransport>,
        Arc::clone(&env.notifier) as Arc<dyn Notifier>,
        config,
    )
    .expect("adapter");

    transport.push_incoming(raw_mail("Work@Biz.Example", "Proposal: API", "My own send.", "<m1>"));
    mail.poll().await.expect("poll");

    assert!(env.ctx.projects.find_by_state(ProjectState::New, 10).await.expect("list").is_empty());
}

#[tokio::test]
async fn digest_leads_enter_parsed_and_deduplicate_by_url() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let transport = Arc::new(CapturingTransport::new());
    let mail = adapter(&env, Arc::clone(&transport));

    transport.push_incoming(raw_mail("alerts@freelancer.com", "Project digest", DIGEST, "<d1>"));
    mail.poll().await.expect("poll");

    let leads = env.ctx.projects.find_by_state(ProjectState::Parsed, 10).await.expect("list");
    assert_eq!(leads.len(), 2);
    let scraper = leads
        .iter()
        .find(|p| p.title.contains("scraper"))
        .expect("scraper lead");
    assert_eq!(scraper.source, SourceChannel::Marketplace);
    assert_eq!(scraper.budget_min, Some(250.0));
    assert_eq!(scraper.budget_max, Some(750.0));
    assert_eq!(scraper.tech_stack, vec!["Python", "Scraping"]);
    assert!(scraper.source_url.as_deref().is_some_and(|u| u.contains("retail-scraper")));

    // next day's digest repeats the same listings
    transport.push_incoming(raw_mail("alerts@freelancer.com", "Project digest", DIGEST, "<d2>"));
    mail.poll().await.expect("poll");
    let leads = env.ctx.projects.find_by_state(ProjectState::Parsed, 10).await.expect("list");
    assert_eq!(leads.len(), 2);
}

#[tokio::test]
async fn reply_to_our_correlation_id_moves_offer_into_negotiation() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let transport = Arc::new(CapturingTransport::new());
    let mail = adapter(&env, Arc::clone(&transport));

    let mut new = NewProject::email_inquiry(
        "Inventory API".to_string(),
        "API build".to_string(),
        "sam@example.com".to_string(),
        None,
        Some("<inq>".to_string()),
    );
    new.state = ProjectState::OfferSent;
    let project = env.ctx.projects.create(&new).await.expect("create");

    let proposal = env
        .ctx
        .messages
        .insert(&NewMessage::outbound(
            project.id,
            "work@biz.example".to_string(),
            "sam@example.com".to_string(),
            "Proposal: Inventory API".to_string(),
            "Here is my offer.".to_string(),
        ))
        .await
        .expect("insert");
    let correlation = proposal.correlation_id.expect("correlation id");

    let mut reply = raw_mail("sam@example.com", "Re: Proposal: Inventory API", "Can we talk price?", "<r1>");
    reply.in_reply_to = vec![correlation];
    transport.push_incoming(reply);
    mail.poll().await.expect("poll");

    let moved = env.ctx.projects.get(project.id).await.expect("get");
    assert_eq!(moved.current_state, ProjectState::Negotiation);
    // the reply is left unprocessed for the negotiation stage
    assert_eq!(
        env.ctx
            .messages
            .unprocessed_inbound(project.id)
            .await
            .expect("pending")
            .len(),
        1
    );
}

#[tokio::test]
async fn quoted_listing_url_links_a_fresh_address() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let transport = Arc::new(CapturingTransport::new());
    let mail = adapter(&env, Arc::clone(&transport));

    let url = "https://www.freelancer.com/projects/python/retail-scraper-11111";
    let new = NewProject {
        title: "Retail scraper".to_string(),
        description: "Scrape retail prices".to_string(),
        client_email: String::new(),
        client_id: None,
        source: SourceChannel::Marketplace,
        source_url: Some(url.to_string()),
        source_message_id: Some("<digest>".to_string()),
        state: ProjectState::OfferSent,
        budget_min: None,
        budget_max: None,
        tech_stack: Vec::new(),
        category: None,
    };
    let project = env.ctx.projects.create(&new).await.expect("create");

    // the client moved off-platform and mails directly, quoting the listing
    transport.push_incoming(raw_mail(
        "owner@acme.example",
        "Your bid",
        &format!("Saw your bid on {url} - can you start next week?"),
        "<m1>",
    ));
    mail.poll().await.expect("poll");

    let moved = env.ctx.projects.get(project.id).await.expect("get");
    assert_eq!(moved.current_state, ProjectState::Negotiation);
    // no duplicate project for the unknown address
    assert!(env.ctx.projects.find_by_state(ProjectState::New, 10).await.expect("list").is_empty());
}

#[tokio::test]
async fn bare_re_subject_links_by_sender_address() {
    let env = TestEnv::with_ai(Arc::new(ScriptedAi::new())).await;
    let transport = Arc::new(CapturingTransport::new());
    let mail = adapter(&env, Arc::clone(&transport));

    let mut new = NewProject::email_inquiry(
        "Inventory API".to_string(),
        "API build".to_string(),
        "sam@example.com".to_string(),
        None,
        Some("<inq>".to_string()),
    );
    new.state = ProjectState::OfferSent;
    let project = env.ctx.projects.create(&new).await.expect("create");

    // mail client stripped the references header
    transport.push_incoming(raw_mail("sam@example.com", "RE: Inventory API", "Sounds good.", "<r1>"));
    mail.poll().await.expect("poll");

    assert_eq!(
        env.ctx.projects.get(project.id).await.expect("get").current_state,
        ProjectState::Negotiation
    );
}

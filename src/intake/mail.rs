//! Mail intake adapter: polls the mailbox, links replies to projects,
//! applies domain filtering, and turns fresh inquiries (and marketplace
//! digests) into projects.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::machine;
use crate::models::message::NewMessage;
use crate::models::project::{NewProject, ProjectState, SourceChannel};
use crate::models::transition::TransitionActor;
use crate::persistence::settings_repo::{KEY_MAIL_ALLOWED_DOMAINS, KEY_MAIL_BLOCKED_DOMAINS};
use crate::persistence::{ClientRepo, MessageRepo, ProjectRepo, SettingsRepo};
use crate::services::{MailTransport, Notifier, NotifyEvent, RawMail};
use crate::{GlobalConfig, Result};

use super::digest::DigestParser;

/// Polls the mailbox and feeds the funnel.
pub struct MailAdapter {
    projects: ProjectRepo,
    clients: ClientRepo,
    messages: MessageRepo,
    settings: SettingsRepo,
    transport: Arc<dyn MailTransport>,
    notifier: Arc<dyn Notifier>,
    digest: DigestParser,
    config: GlobalConfig,
}

impl MailAdapter {
    /// Create the adapter.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the digest patterns fail to compile.
    pub fn new(
        projects: ProjectRepo,
        clients: ClientRepo,
        messages: MessageRepo,
        settings: SettingsRepo,
        transport: Arc<dyn MailTransport>,
        notifier: Arc<dyn Notifier>,
        config: GlobalConfig,
    ) -> Result<Self> {
        Ok(Self {
            projects,
            clients,
            messages,
            settings,
            transport,
            notifier,
            digest: DigestParser::new()?,
            config,
        })
    }

    /// Run one poll: fetch unread mail and process each message. Returns
    /// the number of messages handled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Mail` when the fetch itself fails; per-message
    /// failures are logged and skipped.
    pub async fn poll(&self) -> Result<u32> {
        let batch = self.transport.fetch_unread().await?;
        let mut handled = 0;
        for mail in batch {
            match self.process(&mail).await {
                Ok(()) => handled += 1,
                Err(err) => {
                    error!(sender = %mail.sender, error = %err, "mail processing failed");
                }
            }
        }
        Ok(handled)
    }

    async fn process(&self, mail: &RawMail) -> Result<()> {
        // duplicate delivery from the mailbox
        if let Some(id) = &mail.message_id {
            if self.messages.correlation_seen(id).await? {
                debug!(message_id = %id, "duplicate mail, skipping");
                return Ok(());
            }
        }
        // own sends looping back
        if !self.config.mail.from_address.is_empty()
            && mail.sender.eq_ignore_ascii_case(&self.config.mail.from_address)
        {
            return Ok(());
        }

        if self.digest.looks_like_digest(&mail.body) {
            return self.process_digest(mail).await;
        }

        if let Some(project_id) = self.link_reply(mail).await? {
            return self.process_reply(mail, project_id).await;
        }

        self.process_inquiry(mail).await
    }

    /// Resolve the project a mail replies to, in order of confidence:
    /// correlation id of one of our sends, then the most recent active
    /// project for the sender when the subject marks a reply, then a
    /// listing URL quoted in the body.
    async fn link_reply(&self, mail: &RawMail) -> Result<Option<i64>> {
        for ref_id in &mail.in_reply_to {
            if let Some(project_id) = self.messages.project_for_correlation(ref_id).await? {
                return Ok(Some(project_id));
            }
        }
        let subject = mail.subject.trim();
        if subject.to_lowercase().starts_with("re:") {
            if let Some(project) = self.projects.latest_active_by_email(&mail.sender).await? {
                return Ok(Some(project.id));
            }
        }
        if let Some(url) = self.digest.first_link(&mail.body) {
            if let Some(project) = self.projects.find_by_source_url(&url).await? {
                if !machine::is_terminal(project.current_state) {
                    return Ok(Some(project.id));
                }
            }
        }
        Ok(None)
    }

    async fn process_reply(&self, mail: &RawMail, project_id: i64) -> Result<()> {
        let mut message = NewMessage::inbound(
            mail.sender.clone(),
            mail.recipient.clone(),
            mail.subject.clone(),
            mail.body.clone(),
            mail.message_id.clone(),
        );
        message.project_id = Some(project_id);
        message.in_reply_to = mail.in_reply_to.first().cloned();
        self.messages.insert(&message).await?;

        let project = self.projects.get(project_id).await?;
        match project.current_state {
            // client response moves a waiting offer into dialogue
            ProjectState::OfferSent => {
                self.projects
                    .transition(
                        project_id,
                        ProjectState::OfferSent,
                        ProjectState::Negotiation,
                        TransitionActor::External,
                        "client replied to offer",
                        None,
                    )
                    .await?;
            }
            // clarification answered, re-run the requirements stage
            ProjectState::ClarificationNeeded => {
                self.projects
                    .transition(
                        project_id,
                        ProjectState::ClarificationNeeded,
                        ProjectState::Classified,
                        TransitionActor::External,
                        "clarification received",
                        None,
                    )
                    .await?;
            }
            state if machine::is_terminal(state) => {
                debug!(project_id, state = %state, "reply on a settled project, stored only");
            }
            _ => {}
        }
        info!(project_id, "reply linked");
        Ok(())
    }

    async fn process_digest(&self, mail: &RawMail) -> Result<()> {
        let leads = self.digest.parse(&mail.body);
        let mut created = 0;
        for lead in leads {
            if self.projects.find_by_source_url(&lead.url).await?.is_some() {
                continue;
            }
            let new = NewProject {
                title: lead.title.clone(),
                description: lead.description.clone(),
                client_email: String::new(),
                client_id: None,
                source: SourceChannel::Marketplace,
                source_url: Some(lead.url.clone()),
                source_message_id: mail.message_id.clone(),
                // digest leads arrive already structured, no parse pass
                state: ProjectState::Parsed,
                budget_min: lead.budget_min,
                budget_max: lead.budget_max,
                tech_stack: lead.skills.clone(),
                category: None,
            };
            let project = self.projects.create(&new).await?;
            self.notifier
                .notify(&NotifyEvent::NewProject {
                    project_id: project.id,
                    title: project.title.clone(),
                    source: "marketplace digest".to_string(),
                })
                .await?;
            created += 1;
        }

        let mut message = NewMessage::inbound(
            mail.sender.clone(),
            mail.recipient.clone(),
            mail.subject.clone(),
            mail.body.clone(),
            mail.message_id.clone(),
        );
        message.project_id = None;
        let stored = self.messages.insert(&message).await?;
        self.messages.mark_processed(stored.id).await?;

        info!(created, "digest processed");
        Ok(())
    }

    async fn process_inquiry(&self, mail: &RawMail) -> Result<()> {
        if is_bulk_sender(&mail.sender) {
            debug!(sender = %mail.sender, "bulk sender, inquiry dropped");
            return Ok(());
        }
        if !self.domain_permitted(&mail.sender).await? {
            debug!(sender = %mail.sender, "sender domain filtered");
            return Ok(());
        }
        if let Some(client) = self.clients.find_by_email(&mail.sender).await? {
            if client.is_blacklisted {
                warn!(sender = %mail.sender, "blacklisted client, inquiry dropped");
                return Ok(());
            }
        }

        let title = if mail.subject.trim().is_empty() {
            "Untitled inquiry".to_string()
        } else {
            mail.subject.trim().to_string()
        };
        let new = NewProject::email_inquiry(
            title,
            mail.body.clone(),
            mail.sender.clone(),
            None,
            mail.message_id.clone(),
        );
        let project = self.projects.create(&new).await?;

        let mut message = NewMessage::inbound(
            mail.sender.clone(),
            mail.recipient.clone(),
            mail.subject.clone(),
            mail.body.clone(),
            mail.message_id.clone(),
        );
        message.project_id = Some(project.id);
        let stored = self.messages.insert(&message).await?;
        // the body was copied into the project, nothing left to consume
        self.messages.mark_processed(stored.id).await?;

        self.notifier
            .notify(&NotifyEvent::NewProject {
                project_id: project.id,
                title: project.title.clone(),
                source: "email".to_string(),
            })
            .await?;
        info!(project_id = project.id, "inquiry created");
        Ok(())
    }

    async fn domain_permitted(&self, sender: &str) -> Result<bool> {
        let Some((_, domain)) = sender.rsplit_once('@') else {
            return Ok(false);
        };
        let domain = domain.to_lowercase();
        let blocked = self
            .settings
            .get_string_list(KEY_MAIL_BLOCKED_DOMAINS, &self.config.mail.blocked_domains)
            .await?;
        if blocked.iter().any(|d| d.eq_ignore_ascii_case(&domain)) {
            return Ok(false);
        }
        let allowed = self
            .settings
            .get_string_list(KEY_MAIL_ALLOWED_DOMAINS, &self.config.mail.allowed_domains)
            .await?;
        if allowed.is_empty() {
            return Ok(true);
        }
        Ok(allowed.iter().any(|d| d.eq_ignore_ascii_case(&domain)))
    }

    /// Spawn the poll loop until `cancel` fires.
    #[must_use]
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let poll_seconds = self.config.mail.poll_seconds;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(poll_seconds.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("mail adapter stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        match self.poll().await {
                            Ok(0) => {}
                            Ok(n) => info!(messages = n, "mail poll handled"),
                            Err(err) => error!(error = %err, "mail poll failed"),
                        }
                    }
                }
            }
        })
    }
}

/// Automated senders that never represent a real inquiry.
fn is_bulk_sender(sender: &str) -> bool {
    const BULK_PREFIXES: &[&str] = &[
        "noreply",
        "no-reply",
        "no_reply",
        "donotreply",
        "mailer-daemon",
        "postmaster",
        "newsletter",
        "notifications",
    ];
    let local = sender.split('@').next().unwrap_or_default().to_lowercase();
    BULK_PREFIXES.iter().any(|p| local.starts_with(p))
}

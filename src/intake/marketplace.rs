//! Marketplace inbox adapter: polls conversation threads, stores new
//! client messages with duplicate suppression, and nudges waiting projects
//! forward.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::machine;
use crate::models::message::NewMessage;
use crate::models::project::{NewProject, ProjectState, SourceChannel};
use crate::models::transition::TransitionActor;
use crate::persistence::{MessageRepo, ProjectRepo};
use crate::services::{MarketplaceClient, Notifier, NotifyEvent, ThreadMessage, ThreadSummary};
use crate::{GlobalConfig, Result};

/// Polls the marketplace inbox and feeds the funnel.
pub struct InboxAdapter {
    projects: ProjectRepo,
    messages: MessageRepo,
    client: Arc<dyn MarketplaceClient>,
    notifier: Arc<dyn Notifier>,
    config: GlobalConfig,
}

impl InboxAdapter {
    /// Create the adapter.
    #[must_use]
    pub fn new(
        projects: ProjectRepo,
        messages: MessageRepo,
        client: Arc<dyn MarketplaceClient>,
        notifier: Arc<dyn Notifier>,
        config: GlobalConfig,
    ) -> Self {
        Self {
            projects,
            messages,
            client,
            notifier,
            config,
        }
    }

    /// Run one poll over all active threads. Returns the number of new
    /// messages stored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Marketplace` when listing threads fails;
    /// per-thread failures are logged and skipped.
    pub async fn poll(&self) -> Result<u32> {
        let threads = self.client.list_threads().await?;
        let mut stored = 0;
        for thread in threads {
            if self.is_staff(&thread.handle) {
                debug!(handle = %thread.handle, "staff thread, skipping");
                continue;
            }
            match self.process_thread(&thread).await {
                Ok(n) => stored += n,
                Err(err) => {
                    error!(thread_id = %thread.thread_id, error = %err, "thread processing failed");
                }
            }
        }
        Ok(stored)
    }

    fn is_staff(&self, handle: &str) -> bool {
        self.config
            .marketplace
            .staff_handles
            .iter()
            .any(|h| h.eq_ignore_ascii_case(handle))
    }

    async fn process_thread(&self, thread: &ThreadSummary) -> Result<u32> {
        let messages = self.client.thread_messages(&thread.thread_id).await?;
        let mut stored = 0;
        for message in &messages {
            if message.is_own {
                continue;
            }
            if self.already_seen(&thread.thread_id, message).await? {
                continue;
            }
            let project_id = self.resolve_project(thread, message).await?;
            let new = NewMessage {
                project_id: Some(project_id),
                direction: crate::models::message::Direction::Inbound,
                sender: message.author.clone(),
                recipient: String::new(),
                subject: String::new(),
                body: message.body.clone(),
                correlation_id: message.key.clone(),
                in_reply_to: None,
                thread_id: Some(thread.thread_id.clone()),
            };
            self.messages.insert(&new).await?;
            self.nudge(project_id).await?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Duplicate suppression: by message key when the platform exposes one,
    /// by body fingerprint within the thread otherwise.
    async fn already_seen(&self, thread_id: &str, message: &ThreadMessage) -> Result<bool> {
        if let Some(key) = &message.key {
            return self.messages.correlation_seen(key).await;
        }
        self.messages.thread_body_seen(thread_id, &message.body).await
    }

    /// Find the project behind a thread: the synthetic handle email first,
    /// then a fresh project when the counterparty is new.
    async fn resolve_project(
        &self,
        thread: &ThreadSummary,
        message: &ThreadMessage,
    ) -> Result<i64> {
        let synthetic_email = format!(
            "{}@{}",
            thread.handle.to_lowercase(),
            self.config.marketplace.handle_domain
        );
        if let Some(project) = self.projects.latest_active_by_email(&synthetic_email).await? {
            return Ok(project.id);
        }
        if let Some(url) = &thread.project_url {
            if let Some(project) = self.projects.find_by_source_url(url).await? {
                if !machine::is_terminal(project.current_state) {
                    if project.client_email.is_empty() {
                        self.projects
                            .update_fields(
                                project.id,
                                &[crate::models::project::ProjectUpdate::ClientEmail(
                                    synthetic_email.clone(),
                                )],
                            )
                            .await?;
                    }
                    return Ok(project.id);
                }
            }
        }

        let new = NewProject {
            title: format!("Inquiry from {}", thread.handle),
            description: message.body.clone(),
            client_email: synthetic_email,
            client_id: None,
            source: SourceChannel::Marketplace,
            source_url: thread.project_url.clone(),
            source_message_id: Some(thread.thread_id.clone()),
            state: ProjectState::New,
            budget_min: None,
            budget_max: None,
            tech_stack: Vec::new(),
            category: None,
        };
        let project = self.projects.create(&new).await?;
        self.notifier
            .notify(&NotifyEvent::NewProject {
                project_id: project.id,
                title: project.title.clone(),
                source: "marketplace thread".to_string(),
            })
            .await?;
        Ok(project.id)
    }

    /// A fresh client message moves waiting projects forward: a sent offer
    /// into negotiation, an answered clarification back to classification.
    async fn nudge(&self, project_id: i64) -> Result<()> {
        let project = self.projects.get(project_id).await?;
        match project.current_state {
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
            _ => {}
        }
        Ok(())
    }

    /// Spawn the poll loop until `cancel` fires.
    #[must_use]
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let poll_seconds = self.config.marketplace.poll_seconds;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(poll_seconds.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("marketplace adapter stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        match self.poll().await {
                            Ok(0) => {}
                            Ok(n) => info!(messages = n, "marketplace poll handled"),
                            Err(err) => error!(error = %err, "marketplace poll failed"),
                        }
                    }
                }
            }
        })
    }
}

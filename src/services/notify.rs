//! Operator notification sink. Events the owner cares about (new leads,
//! queued offers, escalations) are pushed out of band; delivery failures
//! never fail the pipeline.

use serde_json::json;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::Result;

use super::BoxFuture;

/// An event worth telling the operator about.
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    /// A new project entered the funnel.
    NewProject {
        /// Project id.
        project_id: i64,
        /// Project title.
        title: String,
        /// Arrival channel label.
        source: String,
    },
    /// A project was filtered out or declined.
    ProjectRejected {
        /// Project id.
        project_id: i64,
        /// Project title.
        title: String,
        /// Rejection reason.
        reason: String,
    },
    /// An offer was queued for delivery.
    OfferQueued {
        /// Project id.
        project_id: i64,
        /// Project title.
        title: String,
        /// Quoted price.
        price: f64,
    },
    /// The client accepted; the deal moved to agreed.
    AgreementReached {
        /// Project id.
        project_id: i64,
        /// Project title.
        title: String,
    },
    /// Negotiation exceeded the round limit and needs a human.
    EscalationNeeded {
        /// Project id.
        project_id: i64,
        /// Project title.
        title: String,
        /// Why the dialogue is being handed over.
        reason: String,
    },
}

impl NotifyEvent {
    fn render(&self) -> String {
        match self {
            Self::NewProject {
                project_id,
                title,
                source,
            } => format!("New project #{project_id} via {source}: {title}"),
            Self::ProjectRejected {
                project_id,
                title,
                reason,
            } => format!("Rejected #{project_id} ({title}): {reason}"),
            Self::OfferQueued {
                project_id,
                title,
                price,
            } => format!("Offer queued for #{project_id} ({title}) at {price:.2}"),
            Self::AgreementReached { project_id, title } => {
                format!("Agreement reached on #{project_id}: {title}")
            }
            Self::EscalationNeeded {
                project_id,
                title,
                reason,
            } => format!("Needs attention #{project_id} ({title}): {reason}"),
        }
    }
}

/// Dyn-compatible async notification sink.
pub trait Notifier: Send + Sync {
    /// Push one event. Implementations swallow transient delivery errors.
    fn notify<'a>(&'a self, event: &'a NotifyEvent) -> BoxFuture<'a, Result<()>>;
}

/// Sink used when notifications are disabled.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify<'a>(&'a self, event: &'a NotifyEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            debug!(event = %event.render(), "notifications disabled");
            Ok(())
        })
    }
}

/// Telegram bot sink.
pub struct TelegramNotifier {
    http: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    /// Build a sink from config.
    #[must_use]
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

impl Notifier for TelegramNotifier {
    fn notify<'a>(&'a self, event: &'a NotifyEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = format!(
                "https://api.telegram.org/bot{}/sendMessage",
                self.config.bot_token
            );
            let body = json!({
                "chat_id": self.config.chat_id,
                "text": event.render(),
            });
            match self.http.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(status = %response.status(), "telegram send rejected");
                }
                Err(err) => {
                    warn!(error = %err, "telegram send failed");
                }
            }
            Ok(())
        })
    }
}

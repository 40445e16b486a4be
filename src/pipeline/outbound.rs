//! Outbound delivery drain: pushes queued messages through the mail
//! transport. Delivery failures leave the message queued for the next run.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::action::ActionRecord;
use crate::persistence::{ActionRepo, MessageRepo};
use crate::services::{MailTransport, OutboundMail};
use crate::{GlobalConfig, Result};

const DRAIN_BATCH: i64 = 50;

/// Periodically delivers queued outbound messages.
pub struct OutboundDrain {
    messages: MessageRepo,
    actions: ActionRepo,
    transport: Arc<dyn MailTransport>,
    config: GlobalConfig,
}

impl OutboundDrain {
    /// Create a drain over the message queue.
    #[must_use]
    pub fn new(
        messages: MessageRepo,
        actions: ActionRepo,
        transport: Arc<dyn MailTransport>,
        config: GlobalConfig,
    ) -> Self {
        Self {
            messages,
            actions,
            transport,
            config,
        }
    }

    /// Deliver queued messages, oldest first. Returns the number delivered.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` when the queue cannot be read. Per-message
    /// transport failures are logged and the message stays queued.
    pub async fn drain(&self) -> Result<u32> {
        let pending = self.messages.pending_outbound(DRAIN_BATCH).await?;
        let mut delivered = 0;

        for message in pending {
            // undeliverable rows are retired, not retried forever
            if message.recipient.trim().is_empty() {
                warn!(message_id = message.id, "no recipient, retiring message");
                self.messages.mark_processed(message.id).await?;
                continue;
            }
            let mail = OutboundMail {
                to: message.recipient.clone(),
                subject: message.subject.clone(),
                body: message.body.clone(),
                correlation_id: message.correlation_id.clone(),
                in_reply_to: message.in_reply_to.clone(),
            };
            match self.transport.send(&mail).await {
                Ok(()) => {
                    self.messages.mark_processed(message.id).await?;
                    delivered += 1;
                }
                Err(err) => {
                    warn!(message_id = message.id, error = %err, "delivery failed, keeping queued");
                    let mut record =
                        ActionRecord::failed("outbound", "deliver", &err.to_string());
                    if let Some(project_id) = message.project_id {
                        record = record.for_project(project_id);
                    }
                    self.actions.record(&record).await?;
                }
            }
        }

        Ok(delivered)
    }

    /// Spawn the drain loop until `cancel` fires.
    #[must_use]
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let drain_seconds = self.config.pipeline.outbound_seconds;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(drain_seconds.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("outbound drain stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        match self.drain().await {
                            Ok(0) => {}
                            Ok(n) => info!(delivered = n, "outbound messages delivered"),
                            Err(err) => error!(error = %err, "outbound drain failed"),
                        }
                    }
                }
            }
        })
    }
}

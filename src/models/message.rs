//! Message entity: every inbound and outbound communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Direction of a message relative to the system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Received from a client or marketplace.
    Inbound,
    /// Queued or sent by the system.
    Outbound,
}

impl Direction {
    /// Stable string form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(Self::Inbound),
            "outbound" => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// A single message tied to a project (or awaiting linkage).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Row identifier.
    pub id: i64,
    /// Owning project, once linked.
    pub project_id: Option<i64>,
    /// Inbound or outbound.
    pub direction: Direction,
    /// Sender address or handle.
    pub sender: String,
    /// Recipient address or handle.
    pub recipient: String,
    /// Subject line; empty for marketplace thread messages.
    pub subject: String,
    /// Message body text.
    pub body: String,
    /// Inbound: consumed by a stage handler. Outbound: delivered.
    pub processed: bool,
    /// External correlation id (RFC 5322 Message-ID, thread message key).
    pub correlation_id: Option<String>,
    /// Correlation id of the message this replies to.
    pub in_reply_to: Option<String>,
    /// Conversation thread key for marketplace messages.
    pub thread_id: Option<String>,
    /// Receipt or enqueue timestamp.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Content fingerprint used for duplicate suppression when an external
    /// channel supplies no stable correlation id.
    #[must_use]
    pub fn body_fingerprint(body: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(body.trim().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Insertable message record; the repo assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Owning project, when already known.
    pub project_id: Option<i64>,
    /// Inbound or outbound.
    pub direction: Direction,
    /// Sender address or handle.
    pub sender: String,
    /// Recipient address or handle.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Message body text.
    pub body: String,
    /// External correlation id.
    pub correlation_id: Option<String>,
    /// Correlation id of the message this replies to.
    pub in_reply_to: Option<String>,
    /// Conversation thread key.
    pub thread_id: Option<String>,
}

impl NewMessage {
    /// An inbound message as received from an external channel.
    #[must_use]
    pub fn inbound(
        sender: String,
        recipient: String,
        subject: String,
        body: String,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            project_id: None,
            direction: Direction::Inbound,
            sender,
            recipient,
            subject,
            body,
            correlation_id,
            in_reply_to: None,
            thread_id: None,
        }
    }

    /// An outbound message queued for the delivery drain.
    #[must_use]
    pub fn outbound(
        project_id: i64,
        sender: String,
        recipient: String,
        subject: String,
        body: String,
    ) -> Self {
        Self {
            project_id: Some(project_id),
            direction: Direction::Outbound,
            sender,
            recipient,
            subject,
            body,
            correlation_id: Some(uuid::Uuid::new_v4().to_string()),
            in_reply_to: None,
            thread_id: None,
        }
    }

    /// Attach the correlation id of the message being replied to.
    #[must_use]
    pub fn replying_to(mut self, correlation_id: Option<String>) -> Self {
        self.in_reply_to = correlation_id;
        self
    }

    /// Attach the conversation thread key.
    #[must_use]
    pub fn in_thread(mut self, thread_id: Option<String>) -> Self {
        self.thread_id = thread_id;
        self
    }
}

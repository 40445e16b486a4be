//! Mail transport seam. The pipeline only needs "fetch unread" and
//! "send one message"; concrete IMAP/SMTP engines plug in behind
//! [`MailTransport`].

use tracing::debug;

use crate::Result;

use super::BoxFuture;

/// One message as fetched from the mailbox.
#[derive(Debug, Clone)]
pub struct RawMail {
    /// RFC 5322 Message-ID, when present.
    pub message_id: Option<String>,
    /// Message-IDs this mail replies to (In-Reply-To plus References).
    pub in_reply_to: Vec<String>,
    /// Sender address.
    pub sender: String,
    /// Recipient address.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// One message handed to the transport for delivery.
#[derive(Debug, Clone)]
pub struct OutboundMail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Correlation id stamped as the Message-ID.
    pub correlation_id: Option<String>,
    /// Message-ID this mail replies to.
    pub in_reply_to: Option<String>,
}

/// Dyn-compatible async interface to a mailbox.
pub trait MailTransport: Send + Sync {
    /// Fetch unread messages, marking them read at the source.
    fn fetch_unread(&self) -> BoxFuture<'_, Result<Vec<RawMail>>>;

    /// Deliver one message.
    fn send<'a>(&'a self, mail: &'a OutboundMail) -> BoxFuture<'a, Result<()>>;
}

/// Transport used when no mail engine is wired up: fetches nothing and
/// logs sends instead of delivering them.
pub struct NullTransport;

impl MailTransport for NullTransport {
    fn fetch_unread(&self) -> BoxFuture<'_, Result<Vec<RawMail>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn send<'a>(&'a self, mail: &'a OutboundMail) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            debug!(to = %mail.to, subject = %mail.subject, "mail transport disabled, dropping send");
            Ok(())
        })
    }
}

//! Marketplace client seam: inbox threads and bid submission.

use tracing::debug;

use crate::Result;

use super::BoxFuture;

/// One conversation thread in the marketplace inbox.
#[derive(Debug, Clone)]
pub struct ThreadSummary {
    /// Stable thread key.
    pub thread_id: String,
    /// Counterparty handle.
    pub handle: String,
    /// Project listing URL the thread refers to, when shown.
    pub project_url: Option<String>,
}

/// One message inside a thread.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    /// Stable per-message key, when the platform exposes one.
    pub key: Option<String>,
    /// Author handle.
    pub author: String,
    /// Message text.
    pub body: String,
    /// Authored by our own account.
    pub is_own: bool,
}

/// Bid parameters submitted against a listing.
#[derive(Debug, Clone)]
pub struct BidRequest {
    /// Listing URL.
    pub project_url: String,
    /// Bid amount in listing currency.
    pub amount: f64,
    /// Delivery period in days.
    pub period_days: u32,
    /// Proposal text.
    pub proposal: String,
}

/// Dyn-compatible async interface to the marketplace.
pub trait MarketplaceClient: Send + Sync {
    /// List threads with unread activity.
    fn list_threads(&self) -> BoxFuture<'_, Result<Vec<ThreadSummary>>>;

    /// Fetch all messages in a thread, oldest first.
    fn thread_messages<'a>(&'a self, thread_id: &'a str)
        -> BoxFuture<'a, Result<Vec<ThreadMessage>>>;

    /// Post a reply into a thread.
    fn send_reply<'a>(&'a self, thread_id: &'a str, body: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Submit a bid against a listing.
    fn place_bid<'a>(&'a self, bid: &'a BidRequest) -> BoxFuture<'a, Result<()>>;
}

/// Client used when the marketplace integration is disabled.
pub struct NullMarketplace;

impl MarketplaceClient for NullMarketplace {
    fn list_threads(&self) -> BoxFuture<'_, Result<Vec<ThreadSummary>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn thread_messages<'a>(
        &'a self,
        _thread_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ThreadMessage>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn send_reply<'a>(&'a self, thread_id: &'a str, _body: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            debug!(thread_id, "marketplace disabled, dropping reply");
            Ok(())
        })
    }

    fn place_bid<'a>(&'a self, bid: &'a BidRequest) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            debug!(url = %bid.project_url, amount = bid.amount, "marketplace disabled, dropping bid");
            Ok(())
        })
    }
}

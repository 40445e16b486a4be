//! External capability seams: AI completion, mail transport, marketplace
//! client, and operator notification. Each is a dyn-compatible async trait
//! so stage handlers and adapters can be exercised with fakes in tests.

pub mod ai;
pub mod mail;
pub mod marketplace;
pub mod notify;

use std::future::Future;
use std::pin::Pin;

/// Boxed future alias used by the dyn-compatible service traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use ai::{Completion, CompletionClient, NullCompletion, OpenAiClient};
pub use mail::{MailTransport, NullTransport, OutboundMail, RawMail};
pub use marketplace::{
    BidRequest, MarketplaceClient, NullMarketplace, ThreadMessage, ThreadSummary,
};
pub use notify::{Notifier, NotifyEvent, NullNotifier, TelegramNotifier};

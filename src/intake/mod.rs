//! Inbound adapters: mail polling, marketplace inbox polling, and the
//! digest parser feeding marketplace leads into the funnel.

pub mod digest;
pub mod mail;
pub mod marketplace;

pub use digest::{DigestLead, DigestParser};
pub use mail::MailAdapter;
pub use marketplace::InboxAdapter;

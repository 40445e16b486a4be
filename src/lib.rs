//! Dealflow: an AI-assisted intake and negotiation pipeline for freelance
//! project inquiries. Inbound leads from mail and marketplace channels are
//! persisted as projects and driven through a state machine by background
//! stage handlers until an offer is agreed or the lead is rejected.

#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod intake;
pub mod machine;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod services;
pub mod stages;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};

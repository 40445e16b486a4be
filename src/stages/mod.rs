//! Stage handlers: one per automatic state. The orchestrator resolves the
//! handler for a project's state, runs it, and applies the returned
//! [`StageOutcome`].

pub mod classify;
pub mod estimate;
pub mod negotiate;
pub mod offer;
pub mod parse;
pub mod requirements;
pub mod scam_filter;

use std::sync::Arc;

use crate::machine::StageKind;
use crate::models::project::{Project, ProjectState};
use crate::persistence::{
    ActionRepo, ClientRepo, MessageRepo, ProjectRepo, SettingsRepo, TaskRepo,
};
use crate::services::{BoxFuture, CompletionClient, MarketplaceClient, Notifier};
use crate::{GlobalConfig, Result};

/// What a handler decided for the project it ran against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Move to the stage's regular successor.
    Advance {
        /// Target state.
        next: ProjectState,
        /// Reason recorded in the transition log.
        reason: String,
    },
    /// Move to an alternative state (rejection, clarification loop, or a
    /// degraded advance after an upstream failure).
    Fallback {
        /// Target state.
        next: ProjectState,
        /// Reason recorded in the transition log.
        reason: String,
    },
    /// Leave the project in place; the stage will run again next tick.
    Stay,
}

impl StageOutcome {
    /// Regular advance with a reason.
    #[must_use]
    pub fn advance(next: ProjectState, reason: impl Into<String>) -> Self {
        Self::Advance {
            next,
            reason: reason.into(),
        }
    }

    /// Alternative-path move with a reason.
    #[must_use]
    pub fn fallback(next: ProjectState, reason: impl Into<String>) -> Self {
        Self::Fallback {
            next,
            reason: reason.into(),
        }
    }
}

/// Shared dependencies handed to every stage handler.
#[derive(Clone)]
pub struct StageContext {
    /// Project repository.
    pub projects: ProjectRepo,
    /// Client repository.
    pub clients: ClientRepo,
    /// Message repository.
    pub messages: MessageRepo,
    /// Task repository.
    pub tasks: TaskRepo,
    /// Action-log repository.
    pub actions: ActionRepo,
    /// Runtime settings.
    pub settings: SettingsRepo,
    /// AI completion backend.
    pub ai: Arc<dyn CompletionClient>,
    /// Marketplace client for bid submission.
    pub marketplace: Arc<dyn MarketplaceClient>,
    /// Operator notification sink.
    pub notifier: Arc<dyn Notifier>,
    /// Global configuration.
    pub config: GlobalConfig,
}

/// Dyn-compatible async stage handler.
pub trait StageHandler: Send + Sync {
    /// Process one project. Implementations persist their own field updates
    /// and queued messages; the orchestrator applies the state change.
    fn run<'a>(
        &'a self,
        ctx: &'a StageContext,
        project: &'a Project,
    ) -> BoxFuture<'a, Result<StageOutcome>>;
}

/// Resolve the handler implementation for a stage kind.
#[must_use]
pub fn handler_for(kind: StageKind) -> Box<dyn StageHandler> {
    match kind {
        StageKind::Parse => Box::new(parse::ParseStage),
        StageKind::ScamFilter => Box::new(scam_filter::ScamFilterStage),
        StageKind::Classify => Box::new(classify::ClassifyStage),
        StageKind::Requirements => Box::new(requirements::RequirementsStage),
        StageKind::Estimate => Box::new(estimate::EstimateStage),
        StageKind::Offer => Box::new(offer::OfferStage),
        StageKind::Negotiate => Box::new(negotiate::NegotiateStage),
    }
}

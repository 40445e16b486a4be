//! The pipeline state machine: one static table mapping each state to its
//! handler (if the state is processed automatically) and its default
//! successor. Everything else (auto/manual/terminal views, edge checks)
//! derives from the table so the funnel cannot drift out of sync.

use crate::models::project::ProjectState;

/// The automatic stage bound to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Extract structured fields from the raw inquiry.
    Parse,
    /// Score fraud and illegality risk.
    ScamFilter,
    /// Assign category, complexity, and stack.
    Classify,
    /// Judge brief clarity, ask clarifying questions.
    Requirements,
    /// Produce hours, price, and a task breakdown.
    Estimate,
    /// Compose and queue the offer.
    Offer,
    /// Reply to client messages during negotiation.
    Negotiate,
}

impl StageKind {
    /// Stage name used in logs and the action log.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::ScamFilter => "scam_filter",
            Self::Classify => "classify",
            Self::Requirements => "requirements",
            Self::Estimate => "estimate",
            Self::Offer => "offer",
            Self::Negotiate => "negotiate",
        }
    }
}

/// Table row for one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDef {
    /// Automatic handler, or `None` for manual and terminal states.
    pub handler: Option<StageKind>,
    /// Default successor on `StageOutcome::Advance`, or for the external
    /// event that moves a manual state forward. `None` for terminal states.
    pub default_next: Option<ProjectState>,
}

/// The table row for a state.
#[must_use]
pub fn stage(state: ProjectState) -> StageDef {
    use ProjectState as S;
    match state {
        S::New => def(Some(StageKind::Parse), Some(S::Parsed)),
        S::Parsed => def(Some(StageKind::ScamFilter), Some(S::Analyzed)),
        S::Analyzed => def(Some(StageKind::Classify), Some(S::Classified)),
        S::Classified => def(Some(StageKind::Requirements), Some(S::RequirementsAnalyzed)),
        S::ClarificationNeeded => def(None, Some(S::Classified)),
        S::RequirementsAnalyzed => def(Some(StageKind::Estimate), Some(S::EstimationReady)),
        S::EstimationReady => def(Some(StageKind::Offer), Some(S::OfferSent)),
        S::OfferSent => def(None, Some(S::Negotiation)),
        S::Negotiation => def(Some(StageKind::Negotiate), Some(S::Agreed)),
        S::Agreed => def(None, Some(S::Funded)),
        S::Funded => def(None, Some(S::ExecutionReady)),
        S::ExecutionReady => def(None, Some(S::Closed)),
        S::Closed | S::Rejected => def(None, None),
    }
}

const fn def(handler: Option<StageKind>, default_next: Option<ProjectState>) -> StageDef {
    StageDef {
        handler,
        default_next,
    }
}

/// All states, in funnel order.
#[must_use]
pub fn all_states() -> &'static [ProjectState] {
    use ProjectState as S;
    &[
        S::New,
        S::Parsed,
        S::Analyzed,
        S::Classified,
        S::ClarificationNeeded,
        S::RequirementsAnalyzed,
        S::EstimationReady,
        S::OfferSent,
        S::Negotiation,
        S::Agreed,
        S::Funded,
        S::ExecutionReady,
        S::Closed,
        S::Rejected,
    ]
}

/// States with a bound handler, picked up by the orchestrator each tick.
#[must_use]
pub fn auto_states() -> Vec<ProjectState> {
    all_states()
        .iter()
        .copied()
        .filter(|s| stage(*s).handler.is_some())
        .collect()
}

/// Non-terminal states with no handler; these wait on an external event.
#[must_use]
pub fn manual_states() -> Vec<ProjectState> {
    all_states()
        .iter()
        .copied()
        .filter(|s| stage(*s).handler.is_none() && !is_terminal(*s))
        .collect()
}

/// Whether the state admits no further transitions.
#[must_use]
pub fn is_terminal(state: ProjectState) -> bool {
    stage(state).default_next.is_none() && stage(state).handler.is_none()
}

/// Whether `from -> to` is a recognized funnel edge: the default successor,
/// a handler fallback, or one of the external overrides. Used by auditing,
/// not enforced at write time (the repo enforces only the terminal guard
/// and the stale-precondition check).
#[must_use]
pub fn is_edge(from: ProjectState, to: ProjectState) -> bool {
    use ProjectState as S;
    if stage(from).default_next == Some(to) {
        return true;
    }
    matches!(
        (from, to),
        // side exits into Rejected from the filtering half of the funnel
        (S::New | S::Parsed | S::Analyzed | S::Classified | S::Negotiation, S::Rejected)
            // requirements stage fallback and the client-reply return path
            | (S::Classified, S::ClarificationNeeded)
            | (S::ClarificationNeeded, S::Classified)
            // client reply forces a stalled offer into dialogue
            | (S::OfferSent, S::Negotiation)
    )
}

//! Project entity, lifecycle state enum, and the typed field-update allowlist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a project. Every value change is paired with a
/// transition-log append; see `ProjectRepo::transition`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    /// Raw inbound inquiry, not yet parsed.
    New,
    /// Structured fields extracted from the raw text.
    Parsed,
    /// Passed the scam/illegality filter.
    Analyzed,
    /// Complexity, category, and stack determined.
    Classified,
    /// Clarification questions sent; waiting on the client.
    ClarificationNeeded,
    /// Brief judged clear enough (or round limit reached).
    RequirementsAnalyzed,
    /// Hours, price, and task breakdown produced.
    EstimationReady,
    /// Proposal or bid delivered; waiting on the client.
    OfferSent,
    /// Client replied; dialogue in progress.
    Negotiation,
    /// Client accepted the offer.
    Agreed,
    /// Prepayment received.
    Funded,
    /// Work may begin.
    ExecutionReady,
    /// Deal completed.
    Closed,
    /// Filtered out or declined.
    Rejected,
}

impl ProjectState {
    /// Stable string form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Parsed => "parsed",
            Self::Analyzed => "analyzed",
            Self::Classified => "classified",
            Self::ClarificationNeeded => "clarification_needed",
            Self::RequirementsAnalyzed => "requirements_analyzed",
            Self::EstimationReady => "estimation_ready",
            Self::OfferSent => "offer_sent",
            Self::Negotiation => "negotiation",
            Self::Agreed => "agreed",
            Self::Funded => "funded",
            Self::ExecutionReady => "execution_ready",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "parsed" => Some(Self::Parsed),
            "analyzed" => Some(Self::Analyzed),
            "classified" => Some(Self::Classified),
            "clarification_needed" => Some(Self::ClarificationNeeded),
            "requirements_analyzed" => Some(Self::RequirementsAnalyzed),
            "estimation_ready" => Some(Self::EstimationReady),
            "offer_sent" => Some(Self::OfferSent),
            "negotiation" => Some(Self::Negotiation),
            "agreed" => Some(Self::Agreed),
            "funded" => Some(Self::Funded),
            "execution_ready" => Some(Self::ExecutionReady),
            "closed" => Some(Self::Closed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complexity tier assigned by the classification stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Under ~4 hours.
    Micro,
    /// 4-20 hours.
    Small,
    /// 20-80 hours.
    Medium,
    /// 80-200 hours.
    Large,
    /// Needs research before estimating.
    Rnd,
}

impl Complexity {
    /// Stable string form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Micro => "micro",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Rnd => "rnd",
        }
    }

    /// Parse the stored string form (case-insensitive; AI output varies).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "micro" => Some(Self::Micro),
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            "rnd" => Some(Self::Rnd),
            _ => None,
        }
    }
}

/// Channel a project arrived through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceChannel {
    /// Direct email inquiry.
    Email,
    /// Scraped marketplace digest or thread.
    Marketplace,
}

impl SourceChannel {
    /// Stable string form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Marketplace => "marketplace",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "marketplace" => Some(Self::Marketplace),
            _ => None,
        }
    }
}

/// Project domain entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    /// Row identifier.
    pub id: i64,
    /// Owning client, once linked.
    pub client_id: Option<i64>,
    /// Counterparty email (synthetic `handle@<marketplace>` for threads).
    pub client_email: String,
    /// Short project title.
    pub title: String,
    /// Full brief text.
    pub description: String,
    /// Work category (e.g. `web_development`).
    pub category: Option<String>,
    /// Complexity tier.
    pub complexity: Option<Complexity>,
    /// Technology list.
    pub tech_stack: Vec<String>,
    /// Whether the stack is familiar to the operator.
    pub familiar_stack: Option<bool>,
    /// Lower budget bound, account currency.
    pub budget_min: Option<f64>,
    /// Upper budget bound, account currency.
    pub budget_max: Option<f64>,
    /// Estimated effort in hours (with buffer).
    pub estimated_hours: Option<f64>,
    /// Price quoted in the offer.
    pub quoted_price: Option<f64>,
    /// Price after negotiation.
    pub final_price: Option<f64>,
    /// Fraud risk score, 0.0-1.0.
    pub scam_score: Option<f64>,
    /// Flagged as a scam.
    pub is_scam: bool,
    /// Flagged as requesting illegal work.
    pub is_illegal: bool,
    /// Why the project was rejected.
    pub rejection_reason: Option<String>,
    /// Current pipeline state.
    pub current_state: ProjectState,
    /// Arrival channel.
    pub source: SourceChannel,
    /// External listing URL for marketplace projects.
    pub source_url: Option<String>,
    /// Correlation id of the originating external message.
    pub source_message_id: Option<String>,
    /// Structured analysis blob (clarification round counter, latest
    /// requirements analysis, proposal text). Reused across stages.
    pub analysis: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Clarification rounds already spent, read from the analysis blob.
    #[must_use]
    pub fn clarification_round(&self) -> u32 {
        self.analysis
            .as_ref()
            .and_then(|doc| doc.get("clarification_round"))
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    }
}

/// Insertable project record; the repo assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewProject {
    /// Short project title.
    pub title: String,
    /// Full brief text.
    pub description: String,
    /// Counterparty email, possibly empty for unlinked marketplace leads.
    pub client_email: String,
    /// Owning client, when already known.
    pub client_id: Option<i64>,
    /// Arrival channel.
    pub source: SourceChannel,
    /// External listing URL.
    pub source_url: Option<String>,
    /// Correlation id of the originating message.
    pub source_message_id: Option<String>,
    /// Initial pipeline state.
    pub state: ProjectState,
    /// Budget bounds when already structured (digest intake).
    pub budget_min: Option<f64>,
    /// Upper budget bound.
    pub budget_max: Option<f64>,
    /// Technology list when already structured.
    pub tech_stack: Vec<String>,
    /// Work category when already structured.
    pub category: Option<String>,
}

impl NewProject {
    /// A raw email inquiry entering the funnel at `New`.
    #[must_use]
    pub fn email_inquiry(
        title: String,
        description: String,
        client_email: String,
        client_id: Option<i64>,
        source_message_id: Option<String>,
    ) -> Self {
        Self {
            title,
            description,
            client_email,
            client_id,
            source: SourceChannel::Email,
            source_url: None,
            source_message_id,
            state: ProjectState::New,
            budget_min: None,
            budget_max: None,
            tech_stack: Vec::new(),
            category: None,
        }
    }
}

/// One allow-listed project field assignment.
///
/// `current_state` deliberately has no variant here: state changes must go
/// through `ProjectRepo::transition` so they are always paired with a
/// transition-log append.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectUpdate {
    /// Set the title.
    Title(String),
    /// Set the description.
    Description(String),
    /// Set the work category.
    Category(String),
    /// Set the complexity tier.
    Complexity(Complexity),
    /// Replace the technology list.
    TechStack(Vec<String>),
    /// Set the familiar-stack flag.
    FamiliarStack(bool),
    /// Set the lower budget bound.
    BudgetMin(f64),
    /// Set the upper budget bound.
    BudgetMax(f64),
    /// Set the estimated hours.
    EstimatedHours(f64),
    /// Set the quoted price.
    QuotedPrice(f64),
    /// Set the final negotiated price.
    FinalPrice(f64),
    /// Set the scam score.
    ScamScore(f64),
    /// Set the scam flag.
    IsScam(bool),
    /// Set the illegal flag.
    IsIllegal(bool),
    /// Set the rejection reason.
    RejectionReason(String),
    /// Replace the analysis blob.
    Analysis(serde_json::Value),
    /// Link the owning client.
    ClientId(i64),
    /// Set the counterparty email.
    ClientEmail(String),
    /// Set the source correlation id.
    SourceMessageId(String),
}

impl ProjectUpdate {
    /// Build an update from a field name and a JSON value, as supplied by
    /// operator tooling. `current_state` and unknown names are rejected with
    /// `AppError::FieldNotAllowed`; state changes must go through the
    /// transition path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::FieldNotAllowed` for disallowed or unknown field
    /// names, and for values of the wrong shape.
    pub fn from_named(field: &str, value: serde_json::Value) -> crate::Result<Self> {
        use crate::AppError;
        use serde_json::Value;

        fn bad(field: &str) -> AppError {
            AppError::FieldNotAllowed(format!("bad value for field: {field}"))
        }

        let text = |v: &Value| v.as_str().map(str::to_string).ok_or_else(|| bad(field));
        let real = |v: &Value| v.as_f64().ok_or_else(|| bad(field));
        let flag = |v: &Value| v.as_bool().ok_or_else(|| bad(field));

        match field {
            "title" => Ok(Self::Title(text(&value)?)),
            "description" => Ok(Self::Description(text(&value)?)),
            "category" => Ok(Self::Category(text(&value)?)),
            "complexity" => {
                let raw = text(&value)?;
                Complexity::parse(&raw).map(Self::Complexity).ok_or_else(|| bad(field))
            }
            "tech_stack" => serde_json::from_value(value)
                .map(Self::TechStack)
                .map_err(|_| bad(field)),
            "familiar_stack" => Ok(Self::FamiliarStack(flag(&value)?)),
            "budget_min" => Ok(Self::BudgetMin(real(&value)?)),
            "budget_max" => Ok(Self::BudgetMax(real(&value)?)),
            "estimated_hours" => Ok(Self::EstimatedHours(real(&value)?)),
            "quoted_price" => Ok(Self::QuotedPrice(real(&value)?)),
            "final_price" => Ok(Self::FinalPrice(real(&value)?)),
            "scam_score" => Ok(Self::ScamScore(real(&value)?)),
            "is_scam" => Ok(Self::IsScam(flag(&value)?)),
            "is_illegal" => Ok(Self::IsIllegal(flag(&value)?)),
            "rejection_reason" => Ok(Self::RejectionReason(text(&value)?)),
            "analysis" => Ok(Self::Analysis(value)),
            "client_id" => value
                .as_i64()
                .map(Self::ClientId)
                .ok_or_else(|| bad(field)),
            "client_email" => Ok(Self::ClientEmail(text(&value)?)),
            "source_message_id" => Ok(Self::SourceMessageId(text(&value)?)),
            other => Err(crate::AppError::FieldNotAllowed(other.to_string())),
        }
    }
}

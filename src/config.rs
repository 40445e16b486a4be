//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// AI completion endpoint settings.
///
/// The API key is loaded at runtime from the `DEALFLOW_AI_KEY` (or
/// `OPENAI_API_KEY`) environment variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AiConfig {
    /// OpenAI-compatible chat completions base URL.
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    /// Model identifier sent with every request.
    #[serde(default = "default_ai_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_ai_temperature")]
    pub temperature: f64,
    /// Completion token cap.
    #[serde(default = "default_ai_max_tokens")]
    pub max_tokens: u32,
    /// API key (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".into()
}

fn default_ai_temperature() -> f64 {
    0.7
}

fn default_ai_max_tokens() -> u32 {
    2000
}

/// Mail intake and delivery settings.
///
/// The transport itself (IMAP/SMTP) sits behind the `MailTransport` seam;
/// this block only controls polling cadence and sender identity.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MailConfig {
    /// Whether the mail adapter loop runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between mailbox polls.
    #[serde(default = "default_mail_poll_seconds")]
    pub poll_seconds: u64,
    /// From-address used on queued outbound messages.
    #[serde(default)]
    pub from_address: String,
    /// Sender domains that never create new projects.
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    /// When non-empty, only these sender domains may create new projects.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

fn default_mail_poll_seconds() -> u64 {
    30
}

/// Marketplace inbox polling and bidding settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MarketplaceConfig {
    /// Whether the marketplace inbox loop runs at all.
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between inbox polls.
    #[serde(default = "default_marketplace_poll_seconds")]
    pub poll_seconds: u64,
    /// Platform staff handles whose threads are never client leads.
    #[serde(default = "default_staff_handles")]
    pub staff_handles: Vec<String>,
    /// Synthetic email domain appended to marketplace handles.
    #[serde(default = "default_handle_domain")]
    pub handle_domain: String,
    /// Default bid duration in days.
    #[serde(default = "default_bid_days")]
    pub bid_days: u32,
}

fn default_marketplace_poll_seconds() -> u64 {
    120
}

fn default_staff_handles() -> Vec<String> {
    ["flsofia", "flmandy", "flalexi", "rayrecruiter", "freelancer"]
        .map(str::to_owned)
        .to_vec()
}

fn default_handle_domain() -> String {
    "freelancer.com".into()
}

fn default_bid_days() -> u32 {
    7
}

/// Telegram notification sink settings.
///
/// The bot token is loaded from the `TELEGRAM_BOT_TOKEN` environment
/// variable at runtime.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TelegramConfig {
    /// Whether notifications are delivered at all.
    #[serde(default)]
    pub enabled: bool,
    /// Chat (owner) identifier messages are pushed to.
    #[serde(default)]
    pub chat_id: String,
    /// Bot token (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

/// Pipeline cadence and business defaults.
///
/// The business defaults double as fallbacks for the corresponding
/// `system_settings` rows — a missing setting never blocks a handler.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Seconds between orchestrator ticks.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    /// Maximum projects advanced per tick.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
    /// Seconds between outbound delivery drains.
    #[serde(default = "default_outbound_seconds")]
    pub outbound_seconds: u64,
    /// Hourly rate used for estimates, in account currency.
    #[serde(default = "default_hourly_rate")]
    pub hourly_rate: f64,
    /// Upfront payment percentage quoted in terms.
    #[serde(default = "default_prepayment_percentage")]
    pub prepayment_percentage: u32,
    /// Scam score at or above which a project is rejected.
    #[serde(default = "default_scam_threshold")]
    pub scam_threshold: f64,
    /// Clarity score (0-10) below which clarification is requested.
    #[serde(default = "default_clarity_threshold")]
    pub clarity_threshold: f64,
    /// Clarification rounds before proceeding on assumptions.
    #[serde(default = "default_max_clarification_rounds")]
    pub max_clarification_rounds: u32,
    /// Negotiation exchanges before escalating to the operator.
    #[serde(default = "default_max_negotiation_rounds")]
    pub max_negotiation_rounds: u32,
    /// Hours assumed when estimation falls back on defaults.
    #[serde(default = "default_fallback_hours")]
    pub default_hours: f64,
}

fn default_tick_seconds() -> u64 {
    15
}

fn default_batch_limit() -> u32 {
    20
}

fn default_outbound_seconds() -> u64 {
    30
}

fn default_hourly_rate() -> f64 {
    50.0
}

fn default_prepayment_percentage() -> u32 {
    50
}

fn default_scam_threshold() -> f64 {
    0.7
}

fn default_clarity_threshold() -> f64 {
    6.0
}

fn default_max_clarification_rounds() -> u32 {
    3
}

fn default_max_negotiation_rounds() -> u32 {
    5
}

fn default_fallback_hours() -> f64 {
    20.0
}

/// Business identity used in proposals and signatures.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IdentityConfig {
    /// Trading name.
    #[serde(default)]
    pub business_name: String,
    /// Owner / signatory name.
    #[serde(default)]
    pub owner: String,
    /// Public contact email.
    #[serde(default)]
    pub email: String,
    /// Optional website line for the signature.
    #[serde(default)]
    pub website: String,
}

impl IdentityConfig {
    /// Plain-text signature block appended to outbound messages.
    #[must_use]
    pub fn signature(&self) -> String {
        let mut lines = vec!["--".to_owned()];
        if !self.owner.is_empty() {
            lines.push(self.owner.clone());
        }
        if !self.business_name.is_empty() {
            lines.push(self.business_name.clone());
        }
        if !self.website.is_empty() {
            lines.push(format!("Web: {}", self.website));
        }
        if !self.email.is_empty() {
            lines.push(format!("E-Mail: {}", self.email));
        }
        lines.join("\n")
    }
}

fn default_true() -> bool {
    true
}

fn default_db_path() -> PathBuf {
    PathBuf::from("dealflow.db")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// AI completion endpoint settings.
    #[serde(default = "AiConfig::default_block")]
    pub ai: AiConfig,
    /// Mail adapter settings.
    #[serde(default = "MailConfig::default_block")]
    pub mail: MailConfig,
    /// Marketplace adapter settings.
    #[serde(default = "MarketplaceConfig::default_block")]
    pub marketplace: MarketplaceConfig,
    /// Telegram notification settings.
    #[serde(default = "TelegramConfig::default_block")]
    pub telegram: TelegramConfig,
    /// Pipeline cadence and business defaults.
    #[serde(default = "PipelineConfig::default_block")]
    pub pipeline: PipelineConfig,
    /// Business identity for proposals and signatures.
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl AiConfig {
    fn default_block() -> Self {
        Self {
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            temperature: default_ai_temperature(),
            max_tokens: default_ai_max_tokens(),
            api_key: String::new(),
        }
    }
}

impl MailConfig {
    fn default_block() -> Self {
        Self {
            enabled: true,
            poll_seconds: default_mail_poll_seconds(),
            from_address: String::new(),
            blocked_domains: Vec::new(),
            allowed_domains: Vec::new(),
        }
    }
}

impl MarketplaceConfig {
    fn default_block() -> Self {
        Self {
            enabled: false,
            poll_seconds: default_marketplace_poll_seconds(),
            staff_handles: default_staff_handles(),
            handle_domain: default_handle_domain(),
            bid_days: default_bid_days(),
        }
    }
}

impl TelegramConfig {
    fn default_block() -> Self {
        Self {
            enabled: false,
            chat_id: String::new(),
            bot_token: String::new(),
        }
    }
}

impl PipelineConfig {
    fn default_block() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
            batch_limit: default_batch_limit(),
            outbound_seconds: default_outbound_seconds(),
            hourly_rate: default_hourly_rate(),
            prepayment_percentage: default_prepayment_percentage(),
            scam_threshold: default_scam_threshold(),
            clarity_threshold: default_clarity_threshold(),
            max_clarification_rounds: default_max_clarification_rounds(),
            max_negotiation_rounds: default_max_negotiation_rounds(),
            default_hours: default_fallback_hours(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load secrets from environment variables.
    ///
    /// The AI key comes from `DEALFLOW_AI_KEY` with an `OPENAI_API_KEY`
    /// fallback; the Telegram bot token from `TELEGRAM_BOT_TOKEN`. Missing
    /// values degrade the corresponding capability rather than failing
    /// startup: handlers fall back and notifications are dropped.
    pub fn load_credentials(&mut self) {
        self.ai.api_key = env::var("DEALFLOW_AI_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .unwrap_or_default();
        if self.ai.api_key.is_empty() {
            warn!("no AI api key configured; stage handlers will use fallbacks");
        }

        self.telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if self.telegram.enabled && self.telegram.bot_token.is_empty() {
            warn!("telegram enabled but TELEGRAM_BOT_TOKEN is unset; notifications disabled");
            self.telegram.enabled = false;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.batch_limit == 0 {
            return Err(AppError::Config("batch_limit must be greater than zero".into()));
        }
        if !(0.0..=1.0).contains(&self.pipeline.scam_threshold) {
            return Err(AppError::Config("scam_threshold must be within 0.0..=1.0".into()));
        }
        if !(0.0..=10.0).contains(&self.pipeline.clarity_threshold) {
            return Err(AppError::Config(
                "clarity_threshold must be within 0.0..=10.0".into(),
            ));
        }
        if self.pipeline.prepayment_percentage > 100 {
            return Err(AppError::Config(
                "prepayment_percentage must not exceed 100".into(),
            ));
        }
        Ok(())
    }
}

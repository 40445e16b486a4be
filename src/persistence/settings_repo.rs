//! Typed key/value runtime settings. Operating parameters (rates,
//! thresholds, round limits) live here so they can change without a
//! restart; config supplies the seed values.

use std::sync::Arc;

use chrono::Utc;

use crate::models::setting::SettingValue;
use crate::{GlobalConfig, Result};

use super::db::Database;

/// Hourly rate used for pricing, in account currency.
pub const KEY_HOURLY_RATE: &str = "hourly_rate";
/// Prepayment share requested in offers, percent.
pub const KEY_PREPAYMENT_PERCENTAGE: &str = "prepayment_percentage";
/// Scam score at or above which a project is rejected.
pub const KEY_SCAM_THRESHOLD: &str = "scam_threshold";
/// Clarity score at or above which a brief needs no clarification.
pub const KEY_CLARITY_THRESHOLD: &str = "clarity_threshold";
/// Maximum clarification question rounds per project.
pub const KEY_MAX_CLARIFICATION_ROUNDS: &str = "max_clarification_rounds";
/// Maximum negotiation reply rounds per project.
pub const KEY_MAX_NEGOTIATION_ROUNDS: &str = "max_negotiation_rounds";
/// Sender domains rejected outright at mail intake.
pub const KEY_MAIL_BLOCKED_DOMAINS: &str = "mail_blocked_domains";
/// When non-empty, only these sender domains are accepted at mail intake.
pub const KEY_MAIL_ALLOWED_DOMAINS: &str = "mail_allowed_domains";

/// Repository for system settings.
#[derive(Clone)]
pub struct SettingsRepo {
    db: Arc<Database>,
}

impl SettingsRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch a setting, `None` when unset or unparsable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, key: &str) -> Result<Option<SettingValue>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT value, value_type FROM system_settings WHERE key = ?1")
                .bind(key)
                .fetch_optional(self.db.as_ref())
                .await?;
        Ok(row.and_then(|(value, value_type)| SettingValue::decode(&value_type, &value)))
    }

    /// Upsert a setting.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn set(&self, key: &str, value: &SettingValue) -> Result<()> {
        sqlx::query(
            "INSERT INTO system_settings (key, value, value_type, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 value_type = excluded.value_type,
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value.encode())
        .bind(value.type_tag())
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Fetch a float setting, falling back to `default`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_float(&self, key: &str, default: f64) -> Result<f64> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| v.as_float())
            .unwrap_or(default))
    }

    /// Fetch an integer setting, falling back to `default`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_int(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| v.as_int())
            .unwrap_or(default))
    }

    /// Fetch a string-list setting (stored as JSON), falling back to `default`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_string_list(&self, key: &str, default: &[String]) -> Result<Vec<String>> {
        let value = self.get(key).await?;
        if let Some(SettingValue::Json(doc)) = value {
            if let Ok(list) = serde_json::from_value::<Vec<String>>(doc) {
                return Ok(list);
            }
        }
        Ok(default.to_vec())
    }

    /// Seed settings from config for keys not already present. Existing
    /// values win so operator edits survive restarts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any statement fails.
    pub async fn seed_defaults(&self, config: &GlobalConfig) -> Result<()> {
        let p = &config.pipeline;
        let seeds: Vec<(&str, SettingValue)> = vec![
            (KEY_HOURLY_RATE, SettingValue::Float(p.hourly_rate)),
            (
                KEY_PREPAYMENT_PERCENTAGE,
                SettingValue::Int(i64::from(p.prepayment_percentage)),
            ),
            (KEY_SCAM_THRESHOLD, SettingValue::Float(p.scam_threshold)),
            (KEY_CLARITY_THRESHOLD, SettingValue::Float(p.clarity_threshold)),
            (
                KEY_MAX_CLARIFICATION_ROUNDS,
                SettingValue::Int(i64::from(p.max_clarification_rounds)),
            ),
            (
                KEY_MAX_NEGOTIATION_ROUNDS,
                SettingValue::Int(i64::from(p.max_negotiation_rounds)),
            ),
            (
                KEY_MAIL_BLOCKED_DOMAINS,
                SettingValue::Json(serde_json::json!(config.mail.blocked_domains)),
            ),
            (
                KEY_MAIL_ALLOWED_DOMAINS,
                SettingValue::Json(serde_json::json!(config.mail.allowed_domains)),
            ),
        ];
        let now = Utc::now().to_rfc3339();
        for (key, value) in seeds {
            sqlx::query(
                "INSERT OR IGNORE INTO system_settings (key, value, value_type, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(key)
            .bind(value.encode())
            .bind(value.type_tag())
            .bind(&now)
            .execute(self.db.as_ref())
            .await?;
        }
        Ok(())
    }
}

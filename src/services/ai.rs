//! AI completion client over an OpenAI-compatible chat completions API.

use serde::Deserialize;
use serde_json::json;

use crate::config::AiConfig;
use crate::{AppError, Result};

use super::BoxFuture;

/// One completed AI call.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Model output text.
    pub content: String,
    /// Total tokens billed, when reported.
    pub tokens_used: Option<i64>,
}

/// Dyn-compatible async interface to a chat completion backend.
pub trait CompletionClient: Send + Sync {
    /// Run one completion with a system prompt and a user prompt.
    fn complete<'a>(&'a self, system: &'a str, user: &'a str)
        -> BoxFuture<'a, Result<Completion>>;
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: i64,
}

/// HTTP client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    http: reqwest::Client,
    config: AiConfig,
}

impl OpenAiClient {
    /// Build a client from config. Fails when no API key was loaded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ai` when the API key is empty.
    pub fn new(config: AiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AppError::Ai("ai api key is not configured".into()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            config,
        })
    }

    async fn request(&self, system: &str, user: &str) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::Ai(format!("completion request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Ai(format!("completion http {status}: {text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| AppError::Ai(format!("completion decode failed: {err}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Ai("completion returned no choices".into()))?;

        Ok(Completion {
            content,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
        })
    }
}

impl CompletionClient for OpenAiClient {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> BoxFuture<'a, Result<Completion>> {
        Box::pin(self.request(system, user))
    }
}

/// Backend used when no API key is configured. Every call fails with
/// `AppError::Ai`, which routes stage handlers onto their fallbacks.
pub struct NullCompletion;

impl CompletionClient for NullCompletion {
    fn complete<'a>(
        &'a self,
        _system: &'a str,
        _user: &'a str,
    ) -> BoxFuture<'a, Result<Completion>> {
        Box::pin(async { Err(AppError::Ai("no completion backend configured".into())) })
    }
}

/// Extract the first JSON object from model output, tolerating markdown
/// fences and prose around it.
///
/// # Errors
///
/// Returns `AppError::Ai` when no parsable object is present.
pub fn extract_json(content: &str) -> Result<serde_json::Value> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let start = trimmed
        .find('{')
        .ok_or_else(|| AppError::Ai("no json object in completion".into()))?;
    let end = trimmed
        .rfind('}')
        .ok_or_else(|| AppError::Ai("no json object in completion".into()))?;
    if end < start {
        return Err(AppError::Ai("no json object in completion".into()));
    }
    serde_json::from_str(&trimmed[start..=end])
        .map_err(|err| AppError::Ai(format!("malformed json in completion: {err}")))
}

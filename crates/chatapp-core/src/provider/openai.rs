//! OpenAI-compatible chat completions backend.
//!
//! Covers every server exposing `/chat/completions`:
//!
//! - OpenAI (`https://api.openai.com/v1`)
//! - OpenRouter (`https://openrouter.ai/api/v1`)
//! - DeepSeek (`https://api.deepseek.com/v1`)
//! - Groq (`https://api.groq.com/openai/v1`)
//! - Gemini (`https://generativelanguage.googleapis.com/v1beta/openai`)
//! - vLLM / llama.cpp / any local server via `base_url`

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{ChatMessage, LlmResponse, Usage};
use super::{parse_params, LlmProvider};
use crate::config::Parameters;

pub const ID: &str = "chatapp.providers.OpenAiChat";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Known provider base URLs.
const PROVIDER_URLS: &[(&str, &str)] = &[
    ("openrouter", "https://openrouter.ai/api/v1"),
    ("openai", OPENAI_BASE_URL),
    ("deepseek", "https://api.deepseek.com/v1"),
    ("groq", "https://api.groq.com/openai/v1"),
    (
        "gemini",
        "https://generativelanguage.googleapis.com/v1beta/openai",
    ),
];

/// Maximum number of attempts for transient errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 500;

#[derive(Debug, Deserialize)]
struct OpenAiParams {
    #[serde(alias = "model_name")]
    model: String,
    #[serde(default, alias = "openai_api_key")]
    api_key: Option<String>,
    #[serde(default, alias = "api_base", alias = "openai_api_base")]
    base_url: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

/// Provider for any `/chat/completions` endpoint.
///
/// Retries transient HTTP errors (429, 500, 502, 503, 504) and network
/// failures with exponential backoff.
pub struct OpenAiProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiProvider {
    /// Create a new provider.
    ///
    /// # Arguments
    /// * `provider_name` - Provider identifier used for the base URL table (e.g. "openrouter")
    /// * `api_key` - Bearer token; `None` sends no `Authorization` header
    /// * `api_base` - Custom base URL (overrides the table)
    /// * `model` - Model to request
    pub fn new(
        provider_name: &str,
        api_key: Option<&str>,
        api_base: Option<&str>,
        model: &str,
        client: Client,
    ) -> Self {
        let base_url = api_base
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                PROVIDER_URLS
                    .iter()
                    .find(|(name, _)| *name == provider_name)
                    .map(|(_, url)| url.to_string())
                    .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
            })
            .trim_end_matches('/')
            .to_string();

        debug!(provider = provider_name, base_url = %base_url, model, "Initialized OpenAI-compatible provider");

        Self {
            client,
            api_key: api_key.map(|k| k.to_string()),
            base_url,
            model: model.to_string(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    /// Build from a server record.
    ///
    /// Without an explicit `api_key`, `OPENAI_API_KEY` is used only when the
    /// resolved endpoint is OpenAI's own.
    pub fn from_params(params: &Parameters, client: Client) -> Result<Self> {
        Self::from_params_with_env(params, client, |var| std::env::var(var).ok())
    }

    fn from_params_with_env<F>(params: &Parameters, client: Client, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let p: OpenAiParams = parse_params(params)?;

        let mut provider = Self::new(
            p.provider.as_deref().unwrap_or("openai"),
            p.api_key.as_deref(),
            p.base_url.as_deref(),
            &p.model,
            client,
        );
        if provider.api_key.is_none() && provider.base_url == OPENAI_BASE_URL {
            provider.api_key = env("OPENAI_API_KEY");
        }
        Ok(provider.with_sampling(p.temperature, p.max_tokens))
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Returns `true` if the HTTP status code is transient and should be retried.
    fn is_retryable_status(status: reqwest::StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
    }
}

// ── OpenAI API request/response types ───────────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageResponse>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageResponse {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Single(ErrorBody),
    Multiple(Vec<ErrorBody>),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ErrorResponse {
    fn message(&self) -> String {
        match self {
            Self::Single(b) => b.error.message.clone(),
            Self::Multiple(v) => v
                .first()
                .map(|b| b.error.message.clone())
                .unwrap_or_else(|| "Unknown error".into()),
        }
    }
}

// ── LlmProvider implementation ──────────────────────────────────────

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let request_body = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(model = %self.model, url = %url, msg_count = messages.len(), "Sending chat completion request");

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                warn!(attempt, delay_ms = delay, "Retrying LLM API request");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let mut request = self.client.post(&url).json(&request_body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    // Network-level errors are always retryable.
                    warn!(attempt, error = %e, "Network error calling LLM API");
                    last_error = Some(e.into());
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read LLM API response body")?;

            if !status.is_success() {
                let err_msg = serde_json::from_str::<ErrorResponse>(&body)
                    .map(|e| e.message())
                    .unwrap_or_else(|_| body.clone());

                if Self::is_retryable_status(status) {
                    warn!(attempt, status = %status, "Transient LLM API error, will retry");
                    last_error = Some(anyhow::anyhow!("LLM API error ({}): {}", status, err_msg));
                    continue;
                }

                anyhow::bail!("LLM API error ({}): {}", status, err_msg);
            }

            let completion: CompletionResponse =
                serde_json::from_str(&body).context("Failed to parse LLM API response")?;

            let choice = completion
                .choices
                .into_iter()
                .next()
                .context("LLM API returned no choices")?;

            let usage = completion.usage.map_or(Usage::default(), |u| Usage {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
                total_tokens: u.total_tokens.unwrap_or(0),
            });

            debug!(
                finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
                tokens = usage.total_tokens,
                "Received LLM response"
            );

            return Ok(LlmResponse {
                content: choice.message.content.unwrap_or_default(),
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".into()),
                usage,
            });
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("LLM API request failed after {} attempts", MAX_RETRIES)
        }))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

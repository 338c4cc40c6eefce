//! Ollama chat backend (`POST /api/chat`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{ChatMessage, LlmResponse, Usage};
use super::{parse_params, LlmProvider};
use crate::config::Parameters;

pub const ID: &str = "chatapp.providers.OllamaChat";

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Deserialize)]
struct OllamaParams {
    model: String,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
}

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaProvider {
    pub fn new(base_url: Option<&str>, model: &str, temperature: Option<f32>, client: Client) -> Self {
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        debug!(base_url = %base_url, model, "Initialized Ollama provider");

        Self {
            client,
            base_url,
            model: model.to_string(),
            temperature,
        }
    }

    pub fn from_params(params: &Parameters, client: Client) -> Result<Self> {
        let p: OllamaParams = parse_params(params)?;
        Ok(Self::new(p.base_url.as_deref(), &p.model, p.temperature, client))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<RequestOptions>,
}

#[derive(Serialize)]
struct RequestOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LlmResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: self.temperature.map(|temperature| RequestOptions { temperature }),
        };

        debug!(model = %self.model, url = %url, msg_count = messages.len(), "Sending Ollama chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", self.base_url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read Ollama response body")?;
        if !status.is_success() {
            anyhow::bail!("Ollama error ({}): {}", status, text);
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).context("Failed to parse Ollama response")?;

        let prompt_tokens = parsed.prompt_eval_count.unwrap_or(0);
        let completion_tokens = parsed.eval_count.unwrap_or(0);

        Ok(LlmResponse {
            content: parsed.message.content,
            finish_reason: parsed.done_reason.unwrap_or_else(|| "stop".into()),
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens.saturating_add(completion_tokens),
            },
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_default_base_url() {
        let p = OllamaProvider::new(None, "llama3", None, Client::new());
        assert_eq!(p.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3",
                "stream": false,
                "options": {"temperature": 0.5}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "hey"},
                "done_reason": "stop",
                "prompt_eval_count": 4,
                "eval_count": 2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let params: Parameters = serde_json::from_value(serde_json::json!({
            "model": "llama3",
            "base_url": server.uri(),
            "temperature": 0.5
        }))
        .unwrap();
        let provider = OllamaProvider::from_params(&params, Client::new()).unwrap();

        let response = provider.chat(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(response.content, "hey");
        assert_eq!(response.usage.total_tokens, 6);
    }

    #[tokio::test]
    async fn test_chat_huge_token_counts_saturate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "ok"},
                "prompt_eval_count": u32::MAX,
                "eval_count": 5
            })))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(Some(&server.uri()), "llama3", None, Client::new());
        let response = provider.chat(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(response.usage.total_tokens, u32::MAX);
        assert_eq!(response.finish_reason, "stop");
    }

    #[tokio::test]
    async fn test_chat_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model 'x' not found"))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(Some(&server.uri()), "x", None, Client::new());
        let err = provider.chat(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}

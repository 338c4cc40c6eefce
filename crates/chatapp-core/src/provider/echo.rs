//! Offline backend that echoes the last user message.
//!
//! Useful for trying the shell without credentials and for wiring tests.

use async_trait::async_trait;
use serde::Deserialize;

use super::types::{ChatMessage, LlmResponse, Usage};
use super::{parse_params, LlmProvider};
use crate::config::Parameters;

pub const ID: &str = "chatapp.providers.Echo";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EchoParams {
    prefix: String,
}

pub struct EchoProvider {
    prefix: String,
}

impl EchoProvider {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn from_params(params: &Parameters) -> anyhow::Result<Self> {
        let p: EchoParams = parse_params(params)?;
        Ok(Self::new(&p.prefix))
    }
}

#[async_trait]
impl LlmProvider for EchoProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LlmResponse> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        Ok(LlmResponse {
            content: format!("{}{}", self.prefix, last),
            finish_reason: "stop".into(),
            usage: Usage::default(),
        })
    }

    fn model(&self) -> &str {
        "echo"
    }
}

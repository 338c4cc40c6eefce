//! Scripted provider for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::types::{ChatMessage, LlmResponse, Usage};
use super::LlmProvider;

/// Returns canned replies in order and records every request.
/// Fails once the script runs out. Clones share the script and the log.
#[derive(Clone)]
pub struct ScriptedProvider {
    replies: Arc<Mutex<VecDeque<String>>>,
    requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(Into::into).collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LlmResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;

        Ok(LlmResponse {
            content,
            finish_reason: "stop".into(),
            usage: Usage::default(),
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

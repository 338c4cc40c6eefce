//! Chat session: conversation chain plus the displayed transcript.
//!
//! A `ChatSession` is created once the provider is resolved and lives for
//! the rest of the process. It owns the provider, the summary memory and the
//! list of turns shown to the user.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::memory::SummaryMemory;
use crate::provider::types::ChatMessage;
use crate::provider::LlmProvider;

/// Sends each input together with the memory summary and keeps the
/// summary up to date.
pub struct ConversationChain {
    provider: Box<dyn LlmProvider>,
    memory: SummaryMemory,
}

impl ConversationChain {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self {
            provider,
            memory: SummaryMemory::new(),
        }
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    pub fn memory(&self) -> &SummaryMemory {
        &self.memory
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    /// Produce the reply to `input`.
    ///
    /// A failed summary update is logged and does not fail the turn.
    pub async fn predict(&mut self, input: &str) -> anyhow::Result<String> {
        let prompt = render_prompt(self.memory.summary(), input);
        let response = self.provider.chat(&[ChatMessage::user(&prompt)]).await?;
        let reply = response.content;

        if let Err(e) = self
            .memory
            .update(self.provider.as_ref(), input, &reply)
            .await
        {
            warn!(error = %format!("{e:#}"), "Summary update failed, exchange not remembered");
        }

        Ok(reply)
    }
}

/// Prompt sent for one turn: the summary, then the new input.
pub fn render_prompt(history: &str, input: &str) -> String {
    format!("{history}\n{input}\n\n")
}

/// One displayed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

impl Turn {
    fn now(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// The single conversation of this process.
pub struct ChatSession {
    chain: ConversationChain,
    transcript: Vec<Turn>,
    created_at: String,
}

impl ChatSession {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        info!(model = provider.model(), "Chat session started");
        Self {
            chain: ConversationChain::new(provider),
            transcript: Vec::new(),
            created_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// Record `input`, get the reply, record and return it.
    ///
    /// On error only the user turn stays in the transcript.
    pub async fn send(&mut self, input: &str) -> anyhow::Result<String> {
        self.transcript.push(Turn::now("user", input));
        let reply = self.chain.predict(input).await?;
        self.transcript.push(Turn::now("assistant", &reply));
        Ok(reply)
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn summary(&self) -> &str {
        self.chain.memory().summary()
    }

    pub fn model(&self) -> &str {
        self.chain.provider().model()
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Forget the transcript and the memory summary.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.chain.clear_memory();
    }
}

//! Running-summary conversation memory.
//!
//! Instead of replaying the whole history, the memory keeps one prose summary
//! and asks the model to fold every new exchange into it.

use anyhow::Context;
use tracing::debug;

use crate::provider::types::ChatMessage;
use crate::provider::LlmProvider;

/// Conversation memory holding a progressively updated summary.
#[derive(Debug, Clone, Default)]
pub struct SummaryMemory {
    summary: String,
}

impl SummaryMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current summary; empty before the first exchange.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn clear(&mut self) {
        self.summary.clear();
    }

    /// Fold one human/AI exchange into the summary.
    ///
    /// On error the previous summary is kept unchanged.
    pub async fn update(
        &mut self,
        provider: &dyn LlmProvider,
        human: &str,
        ai: &str,
    ) -> anyhow::Result<()> {
        let prompt = summarize_prompt(&self.summary, human, ai);
        let response = provider
            .chat(&[ChatMessage::user(&prompt)])
            .await
            .context("Failed to update conversation summary")?;

        self.summary = response.content.trim().to_string();
        debug!(summary_len = self.summary.len(), "Conversation summary updated");
        Ok(())
    }
}

fn summarize_prompt(summary: &str, human: &str, ai: &str) -> String {
    format!(
        "Progressively summarize the lines of conversation provided, adding onto the \
         previous summary and returning a new summary.\n\n\
         Current summary:\n{summary}\n\n\
         New lines of conversation:\nHuman: {human}\nAI: {ai}\n\n\
         New summary:"
    )
}

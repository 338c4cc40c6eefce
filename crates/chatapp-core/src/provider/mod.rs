//! LLM provider trait, backends and the profile factory.
//!
//! Defines the `LlmProvider` trait every backend implements. Backends are
//! registered by identifier in an [`ImplementationRegistry`] and built from a
//! server profile by the [`ProviderFactory`].

pub mod echo;
pub mod factory;
#[cfg(test)]
pub(crate) mod mock;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod types;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use factory::{ProviderFactory, ProviderInstance};
pub use registry::{ImplementationRegistry, ProviderConstructor};

use crate::config::Parameters;
use types::{ChatMessage, LlmResponse};

/// Trait for LLM providers.
///
/// A provider turns a conversation into the next assistant turn.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request for `messages`.
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LlmResponse>;

    /// Model identifier this provider talks to.
    fn model(&self) -> &str;
}

/// Deserialize a backend's typed parameter struct from a server record.
pub fn parse_params<T: DeserializeOwned>(params: &Parameters) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::Object(params.clone()))
        .context("invalid provider parameters")
}

//! Registry of backend constructors keyed by implementation identifier.
//!
//! Server records name their backend with a dotted `class` string. Instead of
//! loading code by that name, every supported backend is registered here up
//! front and looked up by exact match.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{echo, ollama, openai, LlmProvider};
use crate::config::Parameters;

/// Builds a provider from a server's constructor parameters.
pub type ProviderConstructor =
    Arc<dyn Fn(&Parameters) -> anyhow::Result<Box<dyn LlmProvider>> + Send + Sync>;

/// Class paths older server files use for the built-in backends.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("langchain_openai.ChatOpenAI", openai::ID),
    ("langchain_community.chat_models.ChatOpenAI", openai::ID),
    ("langchain_ollama.ChatOllama", ollama::ID),
    ("langchain_community.chat_models.ChatOllama", ollama::ID),
];

/// Maps implementation identifiers to constructors.
#[derive(Clone)]
pub struct ImplementationRegistry {
    constructors: HashMap<String, ProviderConstructor>,
}

impl ImplementationRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with every built-in backend and its aliases.
    ///
    /// HTTP backends share `client`.
    pub fn with_builtins(client: reqwest::Client) -> Self {
        let mut registry = Self::new();

        let openai_client = client.clone();
        registry.register(openai::ID, move |params| {
            Ok(Box::new(openai::OpenAiProvider::from_params(
                params,
                openai_client.clone(),
            )?))
        });

        registry.register(ollama::ID, move |params| {
            Ok(Box::new(ollama::OllamaProvider::from_params(
                params,
                client.clone(),
            )?))
        });

        registry.register(echo::ID, |params| {
            Ok(Box::new(echo::EchoProvider::from_params(params)?))
        });

        for (alias, target) in BUILTIN_ALIASES {
            if let Some(ctor) = registry.get(target).cloned() {
                registry.constructors.insert((*alias).to_string(), ctor);
            }
        }

        registry
    }

    /// Register a constructor. Replaces any existing one with the same id.
    pub fn register<F>(&mut self, id: &str, constructor: F)
    where
        F: Fn(&Parameters) -> anyhow::Result<Box<dyn LlmProvider>> + Send + Sync + 'static,
    {
        debug!(implementation = id, "Registered provider implementation");
        self.constructors
            .insert(id.to_string(), Arc::new(constructor));
    }

    /// Make `alias` resolve to the constructor registered as `target`.
    pub fn alias(&mut self, alias: &str, target: &str) -> anyhow::Result<()> {
        let ctor = self
            .get(target)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("cannot alias '{}': '{}' is not registered", alias, target))?;
        self.constructors.insert(alias.to_string(), ctor);
        Ok(())
    }

    /// Look up a constructor by exact identifier.
    pub fn get(&self, id: &str) -> Option<&ProviderConstructor> {
        self.constructors.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl Default for ImplementationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

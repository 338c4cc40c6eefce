//! Resolves a profile name to a constructed provider.
//!
//! Resolution is a straight pipeline: find the server record, look up its
//! implementation, assemble parameters, construct. Any failure ends the
//! attempt; nothing is retried.

use async_trait::async_trait;
use tracing::{debug, info};

use super::registry::ImplementationRegistry;
use super::types::{ChatMessage, LlmResponse};
use super::LlmProvider;
use crate::config::{Parameters, ProviderConfig, ProviderRegistry, RESERVED_KEYS};
use crate::error::{Error, Result};

/// A constructed backend together with the profile it was built from.
pub struct ProviderInstance {
    profile: String,
    class: String,
    parameters: Parameters,
    provider: Box<dyn LlmProvider>,
}

impl ProviderInstance {
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Implementation identifier the backend was resolved from.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Parameters the constructor was actually called with.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }
}

impl std::fmt::Debug for ProviderInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderInstance")
            .field("profile", &self.profile)
            .field("class", &self.class)
            .field("model", &self.provider.model())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for ProviderInstance {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LlmResponse> {
        self.provider.chat(messages).await
    }

    fn model(&self) -> &str {
        self.provider.model()
    }
}

/// Builds providers from server profiles.
pub struct ProviderFactory {
    implementations: ImplementationRegistry,
}

impl ProviderFactory {
    pub fn new(implementations: ImplementationRegistry) -> Self {
        Self { implementations }
    }

    pub fn implementations(&self) -> &ImplementationRegistry {
        &self.implementations
    }

    /// Resolve `profile` against `registry` and construct its backend.
    ///
    /// The first server named `profile` wins. Its declared parameters are
    /// passed to the constructor as-is, minus the `name` and `class` keys.
    pub fn resolve(&self, registry: &ProviderRegistry, profile: &str) -> Result<ProviderInstance> {
        let server = registry
            .find(profile)
            .ok_or_else(|| Error::ProviderNotFound {
                profile: profile.to_string(),
            })?;

        let constructor =
            self.implementations
                .get(&server.class)
                .ok_or_else(|| Error::ImplementationUnresolvable {
                    profile: profile.to_string(),
                    class: server.class.clone(),
                })?;

        let parameters = assemble_parameters(server);
        let keys: Vec<&String> = parameters.keys().collect();
        debug!(profile, class = %server.class, params = ?keys, "Constructing provider");

        let provider = constructor(&parameters).map_err(|source| Error::ProviderConstructionFailed {
            profile: profile.to_string(),
            class: server.class.clone(),
            source,
        })?;

        info!(profile, class = %server.class, model = provider.model(), "Resolved provider");

        Ok(ProviderInstance {
            profile: profile.to_string(),
            class: server.class.clone(),
            parameters,
            provider,
        })
    }
}

/// Constructor arguments for `server`: its parameters without reserved keys.
pub fn assemble_parameters(server: &ProviderConfig) -> Parameters {
    server
        .parameters
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

//! chatapp-core: provider resolution and conversation layer for the chatapp shell.
//!
//! - [`config`] — Server file (`llms.yaml`) loading
//! - [`provider`] — `LlmProvider` trait, built-in backends, implementation registry and profile factory
//! - [`memory`] — Running-summary conversation memory
//! - [`session`] — Conversation chain and the chat session object
//! - [`error`] — Error taxonomy for loading and resolution
//!
//! # Quick Start
//!
//! ```no_run
//! use chatapp_core::config::ProviderRegistry;
//! use chatapp_core::provider::{ImplementationRegistry, ProviderFactory};
//! use chatapp_core::session::ChatSession;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let servers = ProviderRegistry::load("llms.yaml".as_ref())?;
//! let factory = ProviderFactory::new(ImplementationRegistry::with_builtins(reqwest::Client::new()));
//! let instance = factory.resolve(&servers, "local")?;
//!
//! let mut session = ChatSession::new(Box::new(instance));
//! let reply = session.send("What is up?").await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod provider;
pub mod session;

pub use error::{Error, Result};

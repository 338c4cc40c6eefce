//! Error taxonomy for configuration loading and provider resolution.
//!
//! Every variant is terminal for the resolution attempt that produced it.
//! Nothing here is retried.

use std::path::PathBuf;

/// Errors raised while loading the server file or resolving a profile.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration file does not exist or could not be read.
    #[error("config file {} not found or unreadable: {source}", .path.display())]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration document does not have the expected shape.
    #[error("malformed config: {reason}")]
    ConfigMalformed { reason: String },

    /// No server entry carries the requested profile name.
    #[error("server '{profile}' not found")]
    ProviderNotFound { profile: String },

    /// The server's `class` is not registered.
    #[error("implementation '{class}' for server '{profile}' is not registered")]
    ImplementationUnresolvable { profile: String, class: String },

    /// The registered constructor rejected the parameters or failed to build.
    #[error("failed to construct '{class}' for server '{profile}': {source:#}")]
    ProviderConstructionFailed {
        profile: String,
        class: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::ConfigMalformed {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

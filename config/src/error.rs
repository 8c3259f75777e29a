//! Configuration error types.

use std::path::PathBuf;

use fedtx_pool::PoolError;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML document is malformed or has wrong types.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override holds an unusable value.
    #[error("invalid value '{value}' for {variable}: {reason}")]
    InvalidOverride {
        variable: String,
        value: String,
        reason: String,
    },

    /// A setting is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The pool section is inconsistent.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn invalid_override(
        variable: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOverride {
            variable: variable.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

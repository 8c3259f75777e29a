//! Pool error types.

use std::time::Duration;

use fedtx_core::StoreError;
use thiserror::Error;

/// Pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection became available in time.
    #[error("timed out after {waited:?} waiting for a connection")]
    Timeout { waited: Duration },

    /// The pool was closed.
    #[error("connection pool is closed")]
    Closed,

    /// Invalid pool configuration.
    #[error("invalid pool configuration: {message}")]
    InvalidConfig { message: String },

    /// Opening or configuring a physical connection failed.
    #[error("connect error: {0}")]
    Connect(#[from] StoreError),
}

impl PoolError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

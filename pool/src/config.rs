//! Pool configuration.

use std::time::Duration;

use fedtx_core::IsolationLevel;
use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Bounds and connection-level settings of a [`crate::ConnectionPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of physical connections.
    pub max_size: usize,
    /// Idle connections kept open even past the idle timeout.
    pub min_idle: usize,
    /// Idle time after which surplus connections are closed, in milliseconds.
    pub idle_timeout_ms: u64,
    /// How long `acquire` waits for a free connection, in milliseconds.
    pub connection_timeout_ms: u64,
    pub auto_commit: bool,
    pub isolation: IsolationLevel,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 5,
            idle_timeout_ms: 30_000,
            connection_timeout_ms: 20_000,
            auto_commit: false,
            isolation: IsolationLevel::ReadCommitted,
        }
    }
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.max_size == 0 {
            return Err(PoolError::invalid_config("max_size must be at least 1"));
        }
        if self.min_idle > self.max_size {
            return Err(PoolError::invalid_config(format!(
                "min_idle ({}) exceeds max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        Ok(())
    }
}

//! Connection-level and coordinator-level settings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction isolation level of a physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        f.write_str(name)
    }
}

/// How writes issued inside a transaction reach the physical store.
///
/// Fixed for the lifetime of a coordinator; never switched per statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisibilityStrategy {
    /// Forward every statement to the connection as it is issued.
    #[default]
    Immediate,
    /// Buffer writes in a soft transaction and replay them at commit.
    Deferred,
}

impl VisibilityStrategy {
    pub fn is_deferred(&self) -> bool {
        matches!(self, VisibilityStrategy::Deferred)
    }
}

impl fmt::Display for VisibilityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisibilityStrategy::Immediate => f.write_str("immediate"),
            VisibilityStrategy::Deferred => f.write_str("deferred"),
        }
    }
}

impl std::str::FromStr for VisibilityStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" | "immediate_operation" => Ok(VisibilityStrategy::Immediate),
            "deferred" | "defer_operation" => Ok(VisibilityStrategy::Deferred),
            other => Err(format!("unknown visibility strategy '{}'", other)),
        }
    }
}

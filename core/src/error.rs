//! Common error types for FedTx.

use crate::{ConnectionId, Key, Relation};
use thiserror::Error;

/// Errors reported by the federation endpoint and its physical connections.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Relation not known to the endpoint.
    #[error("Unknown relation: {0}")]
    UnknownRelation(Relation),

    /// Column not known to the relation.
    #[error("Unknown column {column} in {relation}")]
    UnknownColumn { relation: Relation, column: String },

    /// Insert would duplicate an existing identity.
    #[error("Duplicate key {key} in {relation}")]
    DuplicateKey { relation: Relation, key: Key },

    /// Insert without a key into a relation that does not generate keys.
    #[error("Missing key column in insert into {0}")]
    MissingKey(Relation),

    /// Type mismatch in a column.
    #[error("Type mismatch in column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    /// Malformed relation name.
    #[error("Invalid relation name {name}: {reason}")]
    InvalidRelation { name: String, reason: String },

    /// A backend behind the federation endpoint refused the operation.
    #[error("Backend {backend} unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// The connection was closed.
    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// Credentials rejected by the endpoint.
    #[error("Authentication failed for user {0}")]
    AuthenticationFailed(String),

    /// `begin` while a transaction is already open on the connection.
    #[error("Transaction already open on connection {0}")]
    TransactionAlreadyOpen(ConnectionId),

    /// The physical commit failed; the transaction was rolled back.
    #[error("Commit failed on connection {connection}: {message}")]
    CommitFailed {
        connection: ConnectionId,
        message: String,
    },
}

impl StoreError {
    pub fn unknown_column(relation: Relation, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            relation,
            column: column.into(),
        }
    }

    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_relation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRelation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn backend_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn commit_failed(connection: ConnectionId, message: impl Into<String>) -> Self {
        Self::CommitFailed {
            connection,
            message: message.into(),
        }
    }

    /// Whether the connection that reported this error is unusable afterwards.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, StoreError::ConnectionClosed(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

//! Orders error types.

use fedtx_core::StoreError;
use fedtx_transaction::TransactionError;
use thiserror::Error;

/// Failure raised by a delegate.
#[derive(Debug, Error)]
pub enum DelegateError {
    /// Expected business failure. Routed to the failure handler; the
    /// transaction still commits.
    #[error("business error {code}: {message}")]
    Business { code: String, message: String },

    /// Unexpected failure. The whole unit of work rolls back.
    #[error("technical error: {0}")]
    Technical(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl DelegateError {
    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Business {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn technical(message: impl Into<String>) -> Self {
        Self::Technical(message.into())
    }
}

impl From<StoreError> for DelegateError {
    fn from(e: StoreError) -> Self {
        Self::Transaction(TransactionError::Store(e))
    }
}

/// Result type for delegates.
pub type DelegateResult<T> = Result<T, DelegateError>;

/// Process engine errors.
#[derive(Debug, Error)]
pub enum OrdersError {
    /// No process definition is deployed under the key.
    #[error("unknown process definition: {0}")]
    UnknownProcess(String),

    /// A step failed technically; the process instance was rolled back.
    #[error("activity '{activity}' failed: {source}")]
    Activity {
        activity: String,
        #[source]
        source: DelegateError,
    },

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl OrdersError {
    pub fn activity(activity: impl Into<String>, source: DelegateError) -> Self {
        Self::Activity {
            activity: activity.into(),
            source,
        }
    }
}

/// Result type for process engine operations.
pub type OrdersResult<T> = Result<T, OrdersError>;

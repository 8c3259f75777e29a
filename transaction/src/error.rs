//! Transaction error types.

use std::time::Duration;

use fedtx_core::{Relation, ScopeToken, Seq, StoreError, TxnId};
use fedtx_pool::PoolError;
use thiserror::Error;

/// Transaction errors.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The context refers to a transaction whose connection is no longer active.
    #[error("stale context: {txn_id} of {scope} is no longer active")]
    StaleContext { txn_id: TxnId, scope: ScopeToken },

    /// No transaction is registered for the scope.
    #[error("no active transaction for {scope}")]
    NoActiveTransaction { scope: ScopeToken },

    /// A buffered operation failed while flushing. The whole transaction
    /// has been rolled back.
    #[error("flush of {txn_id} failed at operation {seq} on {relation}: {source}")]
    FlushFailure {
        txn_id: TxnId,
        seq: Seq,
        relation: Relation,
        #[source]
        source: StoreError,
    },

    /// A transaction stayed registered for longer than expected.
    #[error("{txn_id} of {scope} open for {age:?} with {participants} participant(s)")]
    ParticipationLeak {
        txn_id: TxnId,
        scope: ScopeToken,
        participants: usize,
        age: Duration,
    },

    /// A joined participant asked for rollback, so the owner's commit
    /// rolled the transaction back instead.
    #[error("{txn_id} was marked rollback-only and has been rolled back")]
    RollbackOnly { txn_id: TxnId },

    /// Error reported by the federation endpoint.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error acquiring a connection.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
}

impl TransactionError {
    pub fn stale(txn_id: TxnId, scope: ScopeToken) -> Self {
        Self::StaleContext { txn_id, scope }
    }

    pub fn no_active(scope: ScopeToken) -> Self {
        Self::NoActiveTransaction { scope }
    }

    /// Whether the transaction was rolled back as part of producing this error.
    pub fn rolled_back(&self) -> bool {
        matches!(
            self,
            TransactionError::FlushFailure { .. } | TransactionError::RollbackOnly { .. }
        )
    }
}

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

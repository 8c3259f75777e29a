//! Scoped unit of work.

use fedtx_core::{Statement, StatementResult};
use tracing::{error, warn};

use crate::context::TransactionContext;
use crate::coordinator::{Outcome, TransactionCoordinator};
use crate::error::TransactionResult;

/// A begun or joined transaction that rolls back when dropped uncompleted.
///
/// Covers early returns and panics between `begin_or_join` and `complete`.
pub struct UnitOfWork<'c> {
    coordinator: &'c TransactionCoordinator,
    /// Always `Some` until completion or drop.
    context: Option<TransactionContext>,
}

impl<'c> UnitOfWork<'c> {
    pub(crate) fn new(coordinator: &'c TransactionCoordinator, context: TransactionContext) -> Self {
        Self {
            coordinator,
            context: Some(context),
        }
    }

    pub fn context(&self) -> &TransactionContext {
        self.context
            .as_ref()
            .expect("unit of work already completed")
    }

    pub fn issue(&self, statement: &Statement) -> TransactionResult<StatementResult> {
        self.coordinator.issue(self.context(), statement)
    }

    pub fn commit(self) -> TransactionResult<()> {
        self.complete(Outcome::Commit)
    }

    pub fn rollback(self) -> TransactionResult<()> {
        self.complete(Outcome::Rollback)
    }

    pub fn complete(mut self, outcome: Outcome) -> TransactionResult<()> {
        match self.context.take() {
            Some(context) => self.coordinator.complete(context, outcome),
            None => Ok(()),
        }
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        warn!(
            txn = %context.id(),
            scope = %context.scope(),
            owner = context.is_owner(),
            "unit of work dropped without completion, rolling back"
        );
        if let Err(e) = self.coordinator.rollback(context) {
            error!(error = %e, "rollback of abandoned unit of work failed");
        }
    }
}

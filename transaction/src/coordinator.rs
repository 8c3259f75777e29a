//! Transaction coordinator.
//!
//! Decides between beginning and joining, routes statements through the
//! visibility strategy and lets only the owner reach the physical
//! commit/rollback of the shared connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fedtx_core::{ScopeToken, Statement, StatementResult, TxnId, VisibilityStrategy};
use fedtx_pool::ConnectionProvider;
use tracing::{debug, error, info, warn};

use crate::context::{TransactionContext, TransactionHandle, TransactionState};
use crate::error::{TransactionError, TransactionResult};
use crate::guard::UnitOfWork;
use crate::registry::{ContextRegistry, RegistryEntry};
use crate::strategy::{visibility, Visibility};

/// How a participant ends its unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Commit,
    Rollback,
}

/// Coordinates begin/join/commit/rollback for every scope of a process.
///
/// The visibility strategy is fixed per coordinator.
pub struct TransactionCoordinator {
    provider: Arc<dyn ConnectionProvider>,
    registry: ContextRegistry,
    strategy: VisibilityStrategy,
    next_txn: AtomicU64,
}

impl TransactionCoordinator {
    pub fn new(provider: Arc<dyn ConnectionProvider>, strategy: VisibilityStrategy) -> Self {
        Self {
            provider,
            registry: ContextRegistry::new(),
            strategy,
            next_txn: AtomicU64::new(1),
        }
    }

    pub fn strategy(&self) -> VisibilityStrategy {
        self.strategy
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    // ========== Begin / Join ==========

    /// Begin a transaction for `scope`, or join the one already active there.
    ///
    /// Joining has no effect on the shared connection.
    pub fn begin_or_join(&self, scope: ScopeToken) -> TransactionResult<TransactionContext> {
        let (handle, is_owner) = self
            .registry
            .begin_or_join(scope, || self.open(scope))?;

        if is_owner {
            debug!(
                txn = %handle.id,
                scope = %scope,
                connection = %handle.connection_id,
                strategy = %handle.strategy,
                "began transaction"
            );
            return Ok(TransactionContext::new(handle, true));
        }

        let usable = {
            let state = handle.state.lock();
            handle.is_active() && state.connection.as_ref().map_or(false, |c| c.is_valid())
        };
        if !usable {
            handle.leave();
            return Err(TransactionError::stale(handle.id, scope));
        }
        debug!(
            txn = %handle.id,
            scope = %scope,
            participants = handle.participants(),
            "existing transaction found, joining instead of beginning a new one"
        );
        Ok(TransactionContext::new(handle, false))
    }

    fn open(&self, scope: ScopeToken) -> TransactionResult<TransactionHandle> {
        let mut connection = self.provider.acquire()?;
        // A failed begin drops the connection back into the pool.
        connection.begin()?;
        let id = TxnId::new(self.next_txn.fetch_add(1, Ordering::SeqCst));
        Ok(TransactionHandle::new(id, scope, self.strategy, connection))
    }

    // ========== Statements ==========

    /// Issue a statement within the context's transaction.
    pub fn issue(
        &self,
        context: &TransactionContext,
        statement: &Statement,
    ) -> TransactionResult<StatementResult> {
        let handle = context.handle();
        let mut state = handle.state.lock();
        if !context.is_active() {
            return Err(TransactionError::stale(handle.id, handle.scope));
        }
        visibility(handle.strategy).issue(&mut state, statement)
    }

    // ========== Completion ==========

    /// End a participant's unit of work.
    ///
    /// A joined participant only gives up its participation; a rollback
    /// request marks the transaction rollback-only. The owner flushes (for
    /// deferred writes), physically commits or rolls back, and releases the
    /// connection.
    pub fn complete(
        &self,
        mut context: TransactionContext,
        outcome: Outcome,
    ) -> TransactionResult<()> {
        context.mark_completed();
        let handle = Arc::clone(context.handle());
        let scope = handle.scope;

        let registered = self
            .registry
            .lookup(scope)
            .map_or(false, |current| Arc::ptr_eq(&current, &handle));
        if !registered {
            return Err(TransactionError::no_active(scope));
        }
        handle.leave();

        if !context.is_owner() {
            match outcome {
                Outcome::Commit => {
                    debug!(txn = %handle.id, scope = %scope, "participating in existing transaction, skipping commit");
                }
                Outcome::Rollback => {
                    handle.mark_rollback_only();
                    debug!(txn = %handle.id, scope = %scope, "participating in existing transaction, marking rollback-only");
                }
            }
            return Ok(());
        }

        let outstanding = handle.participants();
        if outstanding > 0 {
            warn!(txn = %handle.id, scope = %scope, outstanding, "owner completing while joined participants are still open");
        }
        self.finish(&handle, outcome)
    }

    /// Shorthand for `complete(context, Outcome::Commit)`.
    pub fn commit(&self, context: TransactionContext) -> TransactionResult<()> {
        self.complete(context, Outcome::Commit)
    }

    /// Shorthand for `complete(context, Outcome::Rollback)`.
    pub fn rollback(&self, context: TransactionContext) -> TransactionResult<()> {
        self.complete(context, Outcome::Rollback)
    }

    /// Physical completion by the owner. The connection is released and the
    /// scope deregistered whatever the result.
    fn finish(&self, handle: &TransactionHandle, outcome: Outcome) -> TransactionResult<()> {
        let mut state = handle.state.lock();
        let strategy = visibility(handle.strategy);

        let result = match outcome {
            Outcome::Commit if handle.is_rollback_only() => {
                self.rollback_after_failure(handle, &mut state, strategy);
                Err(TransactionError::RollbackOnly { txn_id: handle.id })
            }
            Outcome::Commit => self.physical_commit(handle, &mut state, strategy),
            Outcome::Rollback => self.physical_rollback(handle, &mut state, strategy),
        };

        handle.deactivate();
        let connection = state.connection.take();
        drop(state);
        self.registry.deregister(handle.scope, handle.id);
        if let Some(connection) = connection {
            self.provider.release(connection);
        }
        result
    }

    fn physical_commit(
        &self,
        handle: &TransactionHandle,
        state: &mut TransactionState,
        strategy: &dyn Visibility,
    ) -> TransactionResult<()> {
        if let Err(e) = strategy.flush(state) {
            warn!(txn = %handle.id, error = %e, "flush failed, rolling back");
            self.rollback_after_failure(handle, state, strategy);
            return Err(e);
        }
        match state.connection()?.commit() {
            Ok(()) => {
                info!(txn = %handle.id, scope = %handle.scope, "committed transaction");
                Ok(())
            }
            Err(e) => {
                warn!(txn = %handle.id, error = %e, "physical commit failed, rolling back");
                self.rollback_after_failure(handle, state, strategy);
                Err(e.into())
            }
        }
    }

    fn physical_rollback(
        &self,
        handle: &TransactionHandle,
        state: &mut TransactionState,
        strategy: &dyn Visibility,
    ) -> TransactionResult<()> {
        let discarded = strategy.discard(state);
        state.connection()?.rollback()?;
        info!(txn = %handle.id, scope = %handle.scope, discarded, "rolled back transaction");
        Ok(())
    }

    /// Roll back after another failure; a failing rollback is only logged.
    fn rollback_after_failure(
        &self,
        handle: &TransactionHandle,
        state: &mut TransactionState,
        strategy: &dyn Visibility,
    ) {
        let discarded = strategy.discard(state);
        let rolled_back = state
            .connection()
            .and_then(|c| c.rollback().map_err(TransactionError::from));
        match rolled_back {
            Ok(()) => info!(txn = %handle.id, scope = %handle.scope, discarded, "rolled back transaction"),
            Err(e) => error!(txn = %handle.id, error = %e, "rollback failed"),
        }
    }

    // ========== Scoped helpers ==========

    /// Begin or join, run `f`, then commit on `Ok` and roll back on `Err`.
    ///
    /// Inside a joined transaction the commit is skipped and a rollback marks
    /// the transaction rollback-only. If `f` panics the transaction is rolled
    /// back while unwinding.
    pub fn run_in_transaction<T, E, F>(&self, scope: ScopeToken, f: F) -> Result<T, E>
    where
        F: FnOnce(&TransactionContext) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let unit = self.unit_of_work(scope)?;
        match f(unit.context()) {
            Ok(value) => {
                unit.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = unit.rollback() {
                    error!(scope = %scope, error = %rollback_error, "rollback after failed unit of work failed");
                }
                Err(e)
            }
        }
    }

    /// Begin or join, returning a guard that rolls back if dropped without
    /// being completed.
    pub fn unit_of_work(&self, scope: ScopeToken) -> TransactionResult<UnitOfWork<'_>> {
        let context = self.begin_or_join(scope)?;
        Ok(UnitOfWork::new(self, context))
    }

    // ========== Diagnostics ==========

    /// Report transactions registered for longer than `max_age`.
    pub fn report_leaks(&self, max_age: Duration) -> Vec<TransactionError> {
        self.registry
            .leaks(max_age)
            .into_iter()
            .map(|RegistryEntry { scope, txn_id, participants, age }| {
                warn!(txn = %txn_id, scope = %scope, participants, ?age, "possible transaction leak");
                TransactionError::ParticipationLeak {
                    txn_id,
                    scope,
                    participants,
                    age,
                }
            })
            .collect()
    }
}

//! Transaction contexts.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fedtx_core::{ConnectionId, Relation, ScopeToken, TableDescriptor, TxnId, VisibilityStrategy};
use fedtx_pool::LogicalConnection;
use parking_lot::Mutex;
use tracing::warn;

use crate::buffer::SoftTransactionBuffer;
use crate::error::{TransactionError, TransactionResult};

/// Mutable state of a physical transaction, guarded by the handle's lock.
pub(crate) struct TransactionState {
    pub txn_id: TxnId,
    pub scope: ScopeToken,
    /// `None` once the owner completed and released the connection.
    pub connection: Option<LogicalConnection>,
    pub buffer: SoftTransactionBuffer,
    descriptors: HashMap<Relation, TableDescriptor>,
}

impl TransactionState {
    pub fn connection(&mut self) -> TransactionResult<&mut LogicalConnection> {
        self.connection
            .as_mut()
            .ok_or(TransactionError::stale(self.txn_id, self.scope))
    }

    /// Shape of a relation, described once per transaction.
    pub fn descriptor(&mut self, relation: &Relation) -> TransactionResult<TableDescriptor> {
        if let Some(descriptor) = self.descriptors.get(relation) {
            return Ok(descriptor.clone());
        }
        let descriptor = self.connection()?.describe(relation)?;
        self.descriptors
            .insert(relation.clone(), descriptor.clone());
        Ok(descriptor)
    }
}

/// One physical transaction, shared by its owner and every joined participant.
pub(crate) struct TransactionHandle {
    pub id: TxnId,
    pub scope: ScopeToken,
    pub strategy: VisibilityStrategy,
    pub connection_id: ConnectionId,
    pub opened_at: Instant,
    pub state: Mutex<TransactionState>,
    /// Contexts handed out and not yet completed (owner included).
    participants: AtomicUsize,
    rollback_only: AtomicBool,
    active: AtomicBool,
}

impl TransactionHandle {
    pub fn new(
        id: TxnId,
        scope: ScopeToken,
        strategy: VisibilityStrategy,
        connection: LogicalConnection,
    ) -> Self {
        Self {
            id,
            scope,
            strategy,
            connection_id: connection.id(),
            opened_at: Instant::now(),
            state: Mutex::new(TransactionState {
                txn_id: id,
                scope,
                connection: Some(connection),
                buffer: SoftTransactionBuffer::new(),
                descriptors: HashMap::new(),
            }),
            participants: AtomicUsize::new(1),
            rollback_only: AtomicBool::new(false),
            active: AtomicBool::new(true),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Only flipped while holding the state lock.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    pub fn mark_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn participants(&self) -> usize {
        self.participants.load(Ordering::SeqCst)
    }

    pub fn join(&self) {
        self.participants.fetch_add(1, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        let _ = self
            .participants
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("strategy", &self.strategy)
            .field("connection", &self.connection_id)
            .field("active", &self.is_active())
            .field("participants", &self.participants())
            .finish()
    }
}

/// A participant's view of a transaction.
///
/// The owner began the physical transaction and is the only participant that
/// commits or rolls it back; joined contexts share its id and connection.
/// Hand a context back to [`crate::TransactionCoordinator::complete`] when
/// the unit of work ends.
pub struct TransactionContext {
    handle: Arc<TransactionHandle>,
    is_owner: bool,
    completed: bool,
}

impl TransactionContext {
    pub(crate) fn new(handle: Arc<TransactionHandle>, is_owner: bool) -> Self {
        Self {
            handle,
            is_owner,
            completed: false,
        }
    }

    pub(crate) fn handle(&self) -> &Arc<TransactionHandle> {
        &self.handle
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub fn id(&self) -> TxnId {
        self.handle.id
    }

    pub fn scope(&self) -> ScopeToken {
        self.handle.scope
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// True while the physical transaction is open.
    pub fn is_active(&self) -> bool {
        !self.completed && self.handle.is_active()
    }

    pub fn strategy(&self) -> VisibilityStrategy {
        self.handle.strategy
    }

    /// The connection the transaction runs on.
    pub fn connection_id(&self) -> ConnectionId {
        self.handle.connection_id
    }

    pub fn is_rollback_only(&self) -> bool {
        self.handle.is_rollback_only()
    }

    /// Number of buffered soft operations waiting for the flush.
    pub fn pending_operations(&self) -> usize {
        self.handle.state.lock().buffer.len()
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.handle.id)
            .field("scope", &self.handle.scope)
            .field("is_owner", &self.is_owner)
            .field("is_active", &self.is_active())
            .finish()
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if !self.completed && self.handle.is_active() {
            warn!(
                txn = %self.handle.id,
                scope = %self.handle.scope,
                owner = self.is_owner,
                "transaction context dropped without completion"
            );
        }
    }
}

//! Transaction context registry.
//!
//! Maps a scope token to the transaction active in that scope. Each scope has
//! its own slot lock, so opening a transaction for one scope (which may block
//! on the connection pool) never blocks another scope.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fedtx_core::{ScopeToken, TxnId};
use parking_lot::Mutex;

use crate::context::TransactionHandle;
use crate::error::{TransactionError, TransactionResult};

#[derive(Default)]
struct SlotState {
    handle: Option<Arc<TransactionHandle>>,
    /// Set once the slot was removed from the map. A thread that fetched the
    /// slot before removal must look it up again.
    retired: bool,
}

#[derive(Default)]
struct ScopeSlot {
    state: Mutex<SlotState>,
}

/// Snapshot of one registered transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub scope: ScopeToken,
    pub txn_id: TxnId,
    pub participants: usize,
    pub age: Duration,
}

/// Registry of the transactions active per scope.
#[derive(Default)]
pub struct ContextRegistry {
    slots: Mutex<HashMap<ScopeToken, Arc<ScopeSlot>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, scope: ScopeToken) -> Arc<ScopeSlot> {
        Arc::clone(self.slots.lock().entry(scope).or_default())
    }

    fn remove_slot(&self, scope: ScopeToken, slot: &Arc<ScopeSlot>) {
        let mut slots = self.slots.lock();
        if slots.get(&scope).map_or(false, |s| Arc::ptr_eq(s, slot)) {
            slots.remove(&scope);
        }
    }

    /// Join the transaction registered for `scope`, or register the one
    /// produced by `open`.
    ///
    /// Returns the handle and whether the caller became its owner. `open` runs
    /// while the scope's slot is locked, so two callers of the same scope can
    /// never both become owner.
    pub(crate) fn begin_or_join<F>(
        &self,
        scope: ScopeToken,
        open: F,
    ) -> TransactionResult<(Arc<TransactionHandle>, bool)>
    where
        F: FnOnce() -> TransactionResult<TransactionHandle>,
    {
        loop {
            let slot = self.slot(scope);
            let mut state = slot.state.lock();
            if state.retired {
                continue;
            }

            if let Some(handle) = &state.handle {
                if !handle.is_active() {
                    return Err(TransactionError::stale(handle.id, scope));
                }
                handle.join();
                return Ok((Arc::clone(handle), false));
            }

            return match open() {
                Ok(handle) => {
                    let handle = Arc::new(handle);
                    state.handle = Some(Arc::clone(&handle));
                    Ok((handle, true))
                }
                Err(e) => {
                    state.retired = true;
                    self.remove_slot(scope, &slot);
                    Err(e)
                }
            };
        }
    }

    /// The transaction registered for `scope`.
    pub(crate) fn lookup(&self, scope: ScopeToken) -> Option<Arc<TransactionHandle>> {
        let slot = self.slots.lock().get(&scope).cloned()?;
        let state = slot.state.lock();
        state.handle.clone()
    }

    /// Remove the registration of `txn_id` from `scope`.
    ///
    /// Returns false if the scope holds no such transaction.
    pub(crate) fn deregister(&self, scope: ScopeToken, txn_id: TxnId) -> bool {
        let Some(slot) = self.slots.lock().get(&scope).cloned() else {
            return false;
        };
        let mut state = slot.state.lock();
        if !state.handle.as_ref().map_or(false, |h| h.id == txn_id) {
            return false;
        }
        state.handle = None;
        state.retired = true;
        self.remove_slot(scope, &slot);
        true
    }

    /// Registered transactions, oldest first.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        let slots: Vec<Arc<ScopeSlot>> = self.slots.lock().values().cloned().collect();
        let mut entries: Vec<RegistryEntry> = slots
            .iter()
            .filter_map(|slot| {
                let state = slot.state.lock();
                state.handle.as_ref().map(|handle| RegistryEntry {
                    scope: handle.scope,
                    txn_id: handle.id,
                    participants: handle.participants(),
                    age: handle.age(),
                })
            })
            .collect();
        entries.sort_by(|a, b| b.age.cmp(&a.age));
        entries
    }

    /// Registered transactions open for longer than `max_age`, oldest first.
    pub fn leaks(&self, max_age: Duration) -> Vec<RegistryEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.age > max_age)
            .collect()
    }

    /// Whether a transaction is registered for `scope`.
    pub fn contains(&self, scope: ScopeToken) -> bool {
        self.lookup(scope).is_some()
    }

    /// Number of scopes with a registered transaction.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

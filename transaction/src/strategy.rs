//! Write visibility strategies.
//!
//! Immediate forwards every statement to the connection as issued. Deferred
//! keeps writes in the soft-transaction buffer until commit and answers reads
//! on touched relations with the buffer overlaid on committed state.

use std::collections::BTreeMap;

use fedtx_core::{Filter, Key, Statement, StatementResult, StoreError, Value, VisibilityStrategy};
use tracing::debug;

use crate::context::TransactionState;
use crate::error::{TransactionError, TransactionResult};
use crate::overlay::merge_overlay;

/// How statements of a transaction reach the store.
pub(crate) trait Visibility: Send + Sync {
    fn issue(
        &self,
        state: &mut TransactionState,
        statement: &Statement,
    ) -> TransactionResult<StatementResult>;

    /// Send buffered writes to the store in sequence order.
    fn flush(&self, state: &mut TransactionState) -> TransactionResult<()>;

    /// Drop buffered writes. Returns how many were dropped.
    fn discard(&self, state: &mut TransactionState) -> usize;
}

/// The strategy implementation for a selector.
pub(crate) fn visibility(strategy: VisibilityStrategy) -> &'static dyn Visibility {
    match strategy {
        VisibilityStrategy::Immediate => &Immediate,
        VisibilityStrategy::Deferred => &Deferred,
    }
}

pub(crate) struct Immediate;

impl Visibility for Immediate {
    fn issue(
        &self,
        state: &mut TransactionState,
        statement: &Statement,
    ) -> TransactionResult<StatementResult> {
        Ok(state.connection()?.execute(statement)?)
    }

    fn flush(&self, _state: &mut TransactionState) -> TransactionResult<()> {
        Ok(())
    }

    fn discard(&self, _state: &mut TransactionState) -> usize {
        0
    }
}

pub(crate) struct Deferred;

impl Deferred {
    fn overlay_select(
        &self,
        state: &mut TransactionState,
        statement: &Statement,
        filter: &Filter,
    ) -> TransactionResult<StatementResult> {
        let relation = statement.relation();
        let descriptor = state.descriptor(relation)?;

        let mut base = BTreeMap::new();
        for row in state.connection()?.execute(statement)?.into_rows() {
            if let Some(key) = descriptor.key_of(&row) {
                base.insert(key, row);
            }
        }
        // Touched rows the filter missed may match once the buffer applies.
        let missing: Vec<Key> = state
            .buffer
            .touched_keys(relation)
            .filter(|key| !base.contains_key(*key))
            .cloned()
            .collect();
        for key in missing {
            let by_key = Statement::select(relation.clone(), Filter::Key(key.clone()));
            if let Some(row) = state.connection()?.execute(&by_key)?.into_rows().pop() {
                base.insert(key, row);
            }
        }

        let rows = merge_overlay(
            base,
            state.buffer.pending_for(relation),
            &descriptor.key_column,
            filter,
        )?;
        Ok(StatementResult::Rows(rows))
    }
}

impl Visibility for Deferred {
    fn issue(
        &self,
        state: &mut TransactionState,
        statement: &Statement,
    ) -> TransactionResult<StatementResult> {
        let (seq, key) = match statement {
            Statement::Select { relation, filter } => {
                if !state.buffer.touches(relation) {
                    return Ok(state.connection()?.execute(statement)?);
                }
                return self.overlay_select(state, statement, filter);
            }
            Statement::Insert { relation, row } => {
                let descriptor = state.descriptor(relation)?;
                let mut row = row.clone();
                let key = match descriptor.key_of(&row) {
                    Some(key) => key,
                    None if descriptor.generated_key => {
                        let key = state.connection()?.next_key(relation)?;
                        row.insert(descriptor.key_column.clone(), Value::from(&key));
                        key
                    }
                    None => return Err(StoreError::MissingKey(relation.clone()).into()),
                };
                let seq = state
                    .buffer
                    .push_insert(relation.clone(), key.clone(), row);
                (seq, key)
            }
            Statement::Update { relation, key, set } => {
                let seq = state
                    .buffer
                    .push_update(relation.clone(), key.clone(), set.clone());
                (seq, key.clone())
            }
            Statement::Delete { relation, key } => {
                let seq = state.buffer.push_delete(relation.clone(), key.clone());
                (seq, key.clone())
            }
        };
        debug!(txn = %state.txn_id, seq, statement = %statement, "buffered");
        Ok(StatementResult::Buffered { seq, key })
    }

    fn flush(&self, state: &mut TransactionState) -> TransactionResult<()> {
        let operations = state.buffer.drain();
        let txn_id = state.txn_id;
        let connection = state.connection()?;
        for op in &operations {
            match connection.execute(&op.to_statement()) {
                Ok(StatementResult::Affected(0)) => {
                    debug!(txn = %txn_id, seq = op.seq(), kind = %op.kind(), key = %op.key(), "flushed write matched no row");
                }
                Ok(_) => {}
                Err(source) => {
                    return Err(TransactionError::FlushFailure {
                        txn_id,
                        seq: op.seq(),
                        relation: op.relation().clone(),
                        source,
                    });
                }
            }
        }
        if !operations.is_empty() {
            debug!(txn = %txn_id, operations = operations.len(), "flushed soft transaction");
        }
        Ok(())
    }

    fn discard(&self, state: &mut TransactionState) -> usize {
        let dropped = state.buffer.len();
        state.buffer.clear();
        dropped
    }
}

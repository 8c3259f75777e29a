//! Read-your-own-writes overlay.
//!
//! A read on a relation with pending operations is answered from the
//! committed rows with the buffered operations applied on top, in sequence
//! order. Later operations on the same identity override earlier ones.

use std::collections::BTreeMap;

use fedtx_core::{apply_assignments, Filter, Key, Row, StoreResult};

use crate::buffer::PendingOperation;

/// Apply `operations` over `base` and return the rows matching `filter`,
/// in key order.
///
/// `base` must contain every committed row the filter matches plus the
/// committed rows of every identity the operations touch. Updates of an
/// identity absent from both are no-ops, as they would affect no row once
/// flushed.
pub fn merge_overlay<'a>(
    mut base: BTreeMap<Key, Row>,
    operations: impl IntoIterator<Item = &'a PendingOperation>,
    key_column: &str,
    filter: &Filter,
) -> StoreResult<Vec<Row>> {
    for op in operations {
        match op {
            PendingOperation::Insert { key, row, .. } => {
                base.insert(key.clone(), row.clone());
            }
            PendingOperation::Update { key, set, .. } => {
                if let Some(row) = base.get_mut(key) {
                    apply_assignments(row, set)?;
                }
            }
            PendingOperation::Delete { key, .. } => {
                base.remove(key);
            }
        }
    }
    Ok(base
        .into_values()
        .filter(|row| filter.matches(row, key_column))
        .collect())
}

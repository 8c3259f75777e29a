//! Soft-transaction buffer for deferred writes.

use std::collections::{BTreeSet, HashMap};

use fedtx_core::{Assignment, Key, Relation, Row, Seq, Statement, StatementKind};

/// A write accepted but not yet sent to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOperation {
    /// Insert of a full row (the key column is always present).
    Insert {
        seq: Seq,
        relation: Relation,
        key: Key,
        row: Row,
    },
    /// Update of the row with the given identity.
    Update {
        seq: Seq,
        relation: Relation,
        key: Key,
        set: Vec<(String, Assignment)>,
    },
    /// Delete of the row with the given identity.
    Delete {
        seq: Seq,
        relation: Relation,
        key: Key,
    },
}

impl PendingOperation {
    pub fn seq(&self) -> Seq {
        match self {
            PendingOperation::Insert { seq, .. }
            | PendingOperation::Update { seq, .. }
            | PendingOperation::Delete { seq, .. } => *seq,
        }
    }

    pub fn relation(&self) -> &Relation {
        match self {
            PendingOperation::Insert { relation, .. }
            | PendingOperation::Update { relation, .. }
            | PendingOperation::Delete { relation, .. } => relation,
        }
    }

    pub fn key(&self) -> &Key {
        match self {
            PendingOperation::Insert { key, .. }
            | PendingOperation::Update { key, .. }
            | PendingOperation::Delete { key, .. } => key,
        }
    }

    pub fn kind(&self) -> StatementKind {
        match self {
            PendingOperation::Insert { .. } => StatementKind::Insert,
            PendingOperation::Update { .. } => StatementKind::Update,
            PendingOperation::Delete { .. } => StatementKind::Delete,
        }
    }

    /// The statement that applies this operation to the store.
    pub fn to_statement(&self) -> Statement {
        match self {
            PendingOperation::Insert { relation, row, .. } => {
                Statement::insert(relation.clone(), row.clone())
            }
            PendingOperation::Update {
                relation, key, set, ..
            } => Statement::update(relation.clone(), key.clone(), set.clone()),
            PendingOperation::Delete { relation, key, .. } => {
                Statement::delete(relation.clone(), key.clone())
            }
        }
    }
}

/// Ordered writes of one transaction, waiting for the flush.
///
/// Sequence numbers start at 1 and strictly increase in issuance order.
#[derive(Debug, Clone, Default)]
pub struct SoftTransactionBuffer {
    operations: Vec<PendingOperation>,
    /// Last assigned sequence number.
    last_seq: Seq,
    /// Identities written per relation.
    touched: HashMap<Relation, BTreeSet<Key>>,
}

impl SoftTransactionBuffer {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&mut self) -> Seq {
        self.last_seq += 1;
        self.last_seq
    }

    fn touch(&mut self, relation: &Relation, key: &Key) {
        self.touched
            .entry(relation.clone())
            .or_default()
            .insert(key.clone());
    }

    /// Record an insert. `row` must already carry the key column.
    pub fn push_insert(&mut self, relation: Relation, key: Key, row: Row) -> Seq {
        let seq = self.next_seq();
        self.touch(&relation, &key);
        self.operations.push(PendingOperation::Insert {
            seq,
            relation,
            key,
            row,
        });
        seq
    }

    pub fn push_update(&mut self, relation: Relation, key: Key, set: Vec<(String, Assignment)>) -> Seq {
        let seq = self.next_seq();
        self.touch(&relation, &key);
        self.operations.push(PendingOperation::Update {
            seq,
            relation,
            key,
            set,
        });
        seq
    }

    pub fn push_delete(&mut self, relation: Relation, key: Key) -> Seq {
        let seq = self.next_seq();
        self.touch(&relation, &key);
        self.operations
            .push(PendingOperation::Delete { seq, relation, key });
        seq
    }

    /// Whether any pending operation targets the relation.
    pub fn touches(&self, relation: &Relation) -> bool {
        self.touched.contains_key(relation)
    }

    /// Identities of the relation written by pending operations.
    pub fn touched_keys(&self, relation: &Relation) -> impl Iterator<Item = &Key> {
        self.touched.get(relation).into_iter().flatten()
    }

    /// Pending operations on one relation, in sequence order.
    pub fn pending_for<'a>(
        &'a self,
        relation: &'a Relation,
    ) -> impl Iterator<Item = &'a PendingOperation> + 'a {
        self.operations
            .iter()
            .filter(move |op| op.relation() == relation)
    }

    /// All pending operations, in sequence order.
    pub fn operations(&self) -> &[PendingOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Drop every pending operation.
    pub fn clear(&mut self) {
        self.operations.clear();
        self.touched.clear();
    }

    /// Take the pending operations for flushing, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<PendingOperation> {
        self.touched.clear();
        std::mem::take(&mut self.operations)
    }
}

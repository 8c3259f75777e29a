//! Physical connections to the in-memory federation.
//!
//! Writes of an open transaction are staged per connection and published
//! atomically on commit, so other connections only ever observe committed
//! state (read committed).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use fedtx_core::{
    apply_assignments, Assignment, ConnectionId, Filter, IsolationLevel, Key, PhysicalConnection,
    Relation, Row, Statement, StatementResult, StoreError, StoreResult, TableDescriptor,
};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::endpoint::Shared;

/// One staged row write.
#[derive(Debug, Clone)]
enum StagedWrite {
    /// Full image written over the committed row (inserts).
    Put(Row),
    /// Assignments re-applied to the committed row on publish. `image` is
    /// what this connection reads until then.
    Patch {
        image: Row,
        set: Vec<(String, Assignment)>,
    },
    Delete,
}

impl StagedWrite {
    fn image(&self) -> Option<&Row> {
        match self {
            StagedWrite::Put(row) | StagedWrite::Patch { image: row, .. } => Some(row),
            StagedWrite::Delete => None,
        }
    }
}

/// Uncommitted writes of one physical transaction.
#[derive(Debug, Default)]
struct WriteSet {
    staged: HashMap<Relation, BTreeMap<Key, StagedWrite>>,
    /// Identities inserted by this transaction (checked again at commit).
    inserted: BTreeSet<(Relation, Key)>,
}

impl WriteSet {
    fn staged_for(&self, relation: &Relation) -> Option<&BTreeMap<Key, StagedWrite>> {
        self.staged.get(relation)
    }

    fn get(&self, relation: &Relation, key: &Key) -> Option<&StagedWrite> {
        self.staged_for(relation).and_then(|staged| staged.get(key))
    }

    fn stage(&mut self, relation: &Relation, key: Key, write: StagedWrite) {
        self.staged
            .entry(relation.clone())
            .or_default()
            .insert(key, write);
    }

    /// Stage an update. Rows inserted here keep a full image; rows read from
    /// committed state accumulate their assignments.
    fn patch(&mut self, relation: &Relation, key: Key, image: Row, set: &[(String, Assignment)]) {
        let write = match self.get(relation, &key) {
            Some(StagedWrite::Put(_)) => StagedWrite::Put(image),
            Some(StagedWrite::Patch { set: prior, .. }) => StagedWrite::Patch {
                image,
                set: prior.iter().chain(set).cloned().collect(),
            },
            Some(StagedWrite::Delete) | None => StagedWrite::Patch {
                image,
                set: set.to_vec(),
            },
        };
        self.stage(relation, key, write);
    }

    fn len(&self) -> usize {
        self.staged.values().map(BTreeMap::len).sum()
    }
}

/// A connection to a [`crate::Federation`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    shared: Arc<Shared>,
    auto_commit: bool,
    isolation: IsolationLevel,
    txn: Option<WriteSet>,
    closed: bool,
}

impl MemoryConnection {
    pub(crate) fn new(id: ConnectionId, shared: Arc<Shared>) -> Self {
        Self {
            id,
            shared,
            auto_commit: true,
            isolation: IsolationLevel::ReadCommitted,
            txn: None,
            closed: false,
        }
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Number of staged row images in the open transaction.
    pub fn staged_writes(&self) -> usize {
        self.txn.as_ref().map_or(0, WriteSet::len)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::ConnectionClosed(self.id));
        }
        Ok(())
    }

    fn start_transaction(&mut self) {
        self.shared.counters.begins.fetch_add(1, Ordering::SeqCst);
        self.txn = Some(WriteSet::default());
    }

    /// Row visible to this connection: own staged image, else committed.
    fn visible_row(&self, catalog: &Catalog, relation: &Relation, key: &Key) -> StoreResult<Option<Row>> {
        if let Some(write) = self.txn.as_ref().and_then(|t| t.get(relation, key)) {
            return Ok(write.image().cloned());
        }
        Ok(catalog.table(relation)?.rows.get(key).cloned())
    }

    fn check_columns<'a>(
        descriptor: &TableDescriptor,
        columns: impl IntoIterator<Item = &'a str>,
    ) -> StoreResult<()> {
        for column in columns {
            if !descriptor.columns.contains(column) {
                return Err(StoreError::unknown_column(descriptor.relation.clone(), column));
            }
        }
        Ok(())
    }

    fn insert(&mut self, relation: &Relation, mut row: Row) -> StoreResult<StatementResult> {
        let mut catalog = self.shared.catalog.write();
        let table = catalog.table_mut(relation)?;
        if let Some(column) = table.descriptor.unknown_column(&row) {
            return Err(StoreError::unknown_column(relation.clone(), column));
        }
        let key = match table.descriptor.key_of(&row) {
            Some(key) => {
                table.observe_key(&key);
                key
            }
            None if table.descriptor.generated_key => {
                let key = table.alloc_key();
                row.insert(table.descriptor.key_column.clone(), key.clone().into());
                key
            }
            None => return Err(StoreError::MissingKey(relation.clone())),
        };
        if self.visible_row(&catalog, relation, &key)?.is_some() {
            return Err(StoreError::DuplicateKey {
                relation: relation.clone(),
                key,
            });
        }
        let txn = self.txn.get_or_insert_with(WriteSet::default);
        // Re-inserting a row this transaction deleted replaces it.
        if txn.get(relation, &key).is_none() {
            txn.inserted.insert((relation.clone(), key.clone()));
        }
        txn.stage(relation, key.clone(), StagedWrite::Put(row));
        Ok(StatementResult::Inserted { key })
    }

    fn update(
        &mut self,
        relation: &Relation,
        key: &Key,
        set: &[(String, Assignment)],
    ) -> StoreResult<StatementResult> {
        let catalog = self.shared.catalog.read();
        let descriptor = &catalog.table(relation)?.descriptor;
        Self::check_columns(descriptor, set.iter().map(|(c, _)| c.as_str()))?;
        let Some(mut row) = self.visible_row(&catalog, relation, key)? else {
            return Ok(StatementResult::Affected(0));
        };
        apply_assignments(&mut row, set)?;
        drop(catalog);
        self.txn
            .get_or_insert_with(WriteSet::default)
            .patch(relation, key.clone(), row, set);
        Ok(StatementResult::Affected(1))
    }

    fn delete(&mut self, relation: &Relation, key: &Key) -> StoreResult<StatementResult> {
        let catalog = self.shared.catalog.read();
        if self.visible_row(&catalog, relation, key)?.is_none() {
            return Ok(StatementResult::Affected(0));
        }
        drop(catalog);
        self.txn
            .get_or_insert_with(WriteSet::default)
            .stage(relation, key.clone(), StagedWrite::Delete);
        Ok(StatementResult::Affected(1))
    }

    fn select(&self, relation: &Relation, filter: &Filter) -> StoreResult<StatementResult> {
        let catalog = self.shared.catalog.read();
        let table = catalog.table(relation)?;
        Self::check_columns(&table.descriptor, filter.columns())?;

        let mut rows = table.rows.clone();
        if let Some(staged) = self.txn.as_ref().and_then(|t| t.staged_for(relation)) {
            for (key, write) in staged {
                match write.image() {
                    Some(row) => {
                        rows.insert(key.clone(), row.clone());
                    }
                    None => {
                        rows.remove(key);
                    }
                }
            }
        }
        let key_column = &table.descriptor.key_column;
        Ok(StatementResult::Rows(
            rows.into_values()
                .filter(|row| filter.matches(row, key_column))
                .collect(),
        ))
    }

    fn publish(&mut self, txn: WriteSet) -> StoreResult<()> {
        if let Some(message) = self.shared.commit_fault() {
            return Err(StoreError::commit_failed(self.id, message));
        }
        let mut catalog = self.shared.catalog.write();
        // Concurrent committers may have claimed an inserted identity meanwhile.
        for (relation, key) in &txn.inserted {
            let still_inserting = matches!(txn.get(relation, key), Some(StagedWrite::Put(_)));
            if still_inserting && catalog.table(relation)?.rows.contains_key(key) {
                return Err(StoreError::DuplicateKey {
                    relation: relation.clone(),
                    key: key.clone(),
                });
            }
        }
        // A failing patch must leave committed state untouched.
        let mut resolved = Vec::with_capacity(txn.len());
        for (relation, staged) in txn.staged {
            let table = catalog.table(&relation)?;
            for (key, write) in staged {
                let image = match write {
                    StagedWrite::Put(row) => Some(row),
                    StagedWrite::Delete => None,
                    StagedWrite::Patch { set, .. } => match table.rows.get(&key) {
                        Some(current) => {
                            let mut row = current.clone();
                            apply_assignments(&mut row, &set)?;
                            Some(row)
                        }
                        None => {
                            debug!(connection = %self.id, %relation, %key, "row deleted concurrently, update dropped");
                            continue;
                        }
                    },
                };
                resolved.push((relation.clone(), key, image));
            }
        }
        for (relation, key, image) in resolved {
            let table = catalog.table_mut(&relation)?;
            match image {
                Some(row) => {
                    table.rows.insert(key, row);
                }
                None => {
                    table.rows.remove(&key);
                }
            }
        }
        Ok(())
    }
}

impl PhysicalConnection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn set_auto_commit(&mut self, enabled: bool) -> StoreResult<()> {
        self.ensure_open()?;
        self.auto_commit = enabled;
        Ok(())
    }

    fn set_isolation(&mut self, level: IsolationLevel) -> StoreResult<()> {
        self.ensure_open()?;
        self.isolation = level;
        Ok(())
    }

    fn begin(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        if self.txn.is_some() {
            return Err(StoreError::TransactionAlreadyOpen(self.id));
        }
        self.start_transaction();
        debug!(connection = %self.id, "physical begin");
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        let Some(txn) = self.txn.take() else {
            return Ok(());
        };
        let writes = txn.len();
        match self.publish(txn) {
            Ok(()) => {
                self.shared.counters.commits.fetch_add(1, Ordering::SeqCst);
                debug!(connection = %self.id, writes, "physical commit");
                Ok(())
            }
            Err(e) => {
                self.shared.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
                warn!(connection = %self.id, error = %e, "physical commit failed, rolled back");
                Err(e)
            }
        }
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        if let Some(txn) = self.txn.take() {
            self.shared.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
            debug!(connection = %self.id, discarded = txn.len(), "physical rollback");
        }
        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> StoreResult<StatementResult> {
        self.ensure_open()?;
        self.shared.counters.statements.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.shared.statement_fault(statement.relation(), statement.kind()) {
            return Err(error);
        }

        let implicit = statement.kind().is_write() && self.txn.is_none();
        if implicit {
            self.start_transaction();
        }
        let result = match statement {
            Statement::Insert { relation, row } => self.insert(relation, row.clone()),
            Statement::Update { relation, key, set } => self.update(relation, key, set),
            Statement::Delete { relation, key } => self.delete(relation, key),
            Statement::Select { relation, filter } => self.select(relation, filter),
        };
        if implicit && self.auto_commit {
            match &result {
                Ok(_) => self.commit()?,
                Err(_) => self.rollback()?,
            }
        }
        result
    }

    fn describe(&mut self, relation: &Relation) -> StoreResult<TableDescriptor> {
        self.ensure_open()?;
        Ok(self.shared.catalog.read().table(relation)?.descriptor.clone())
    }

    fn next_key(&mut self, relation: &Relation) -> StoreResult<Key> {
        self.ensure_open()?;
        let mut catalog = self.shared.catalog.write();
        let table = catalog.table_mut(relation)?;
        if !table.descriptor.generated_key {
            return Err(StoreError::MissingKey(relation.clone()));
        }
        Ok(table.alloc_key())
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    fn is_valid(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        if self.txn.take().is_some() {
            self.shared.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        self.closed = true;
        debug!(connection = %self.id, "closed federation connection");
    }
}

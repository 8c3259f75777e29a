//! Committed table storage behind the federation endpoint.

use std::collections::{BTreeMap, HashMap};

use fedtx_core::{Key, Relation, Row, StoreError, StoreResult, TableDescriptor};

/// Name of a physical backend (e.g. "runtime", "history").
pub type BackendName = String;

/// One relation's committed rows.
#[derive(Debug)]
pub(crate) struct Table {
    pub descriptor: TableDescriptor,
    pub backend: BackendName,
    pub rows: BTreeMap<Key, Row>,
    next_key: i64,
}

impl Table {
    fn new(descriptor: TableDescriptor, backend: BackendName) -> Self {
        Self {
            descriptor,
            backend,
            rows: BTreeMap::new(),
            next_key: 1,
        }
    }

    /// Allocate the next generated key.
    pub fn alloc_key(&mut self) -> Key {
        let key = Key::Int(self.next_key);
        self.next_key += 1;
        key
    }

    /// Keep the sequence ahead of explicitly supplied integer keys.
    pub fn observe_key(&mut self, key: &Key) {
        if let Key::Int(i) = key {
            if *i >= self.next_key {
                self.next_key = i + 1;
            }
        }
    }
}

/// All relations of the federation, keyed by qualified name.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    tables: HashMap<Relation, Table>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: &str, descriptor: TableDescriptor) -> StoreResult<()> {
        descriptor.relation.validate()?;
        if self.tables.contains_key(&descriptor.relation) {
            return Err(StoreError::invalid_relation(
                descriptor.relation.to_string(),
                "relation registered twice",
            ));
        }
        let relation = descriptor.relation.clone();
        self.tables
            .insert(relation, Table::new(descriptor, backend.to_string()));
        Ok(())
    }

    pub fn table(&self, relation: &Relation) -> StoreResult<&Table> {
        self.tables
            .get(relation)
            .ok_or_else(|| StoreError::UnknownRelation(relation.clone()))
    }

    pub fn table_mut(&mut self, relation: &Relation) -> StoreResult<&mut Table> {
        self.tables
            .get_mut(relation)
            .ok_or_else(|| StoreError::UnknownRelation(relation.clone()))
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.tables.keys()
    }
}

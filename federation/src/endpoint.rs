//! The federation endpoint and its builder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fedtx_core::{
    ConnectionId, Credentials, Endpoint, Key, PhysicalConnection, Relation, Row, StoreError,
    StoreResult, TableDescriptor,
};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::catalog::Catalog;
use crate::connection::MemoryConnection;
use crate::fault::Fault;

/// Counters of physical transaction activity.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub connections: AtomicU64,
    pub begins: AtomicU64,
    pub commits: AtomicU64,
    pub rollbacks: AtomicU64,
    pub statements: AtomicU64,
}

/// Snapshot of [`Counters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FederationStats {
    pub connections: u64,
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub statements: u64,
}

/// State shared by the endpoint and every connection it opened.
#[derive(Debug)]
pub(crate) struct Shared {
    pub catalog: RwLock<Catalog>,
    pub faults: Mutex<Vec<Fault>>,
    pub counters: Counters,
    credentials: Credentials,
    address: String,
    next_connection: AtomicU64,
}

impl Shared {
    /// Return the injected failure for a statement, if any fault matches.
    pub fn statement_fault(&self, relation: &Relation, kind: fedtx_core::StatementKind) -> Option<StoreError> {
        let mut faults = self.faults.lock();
        let fault = faults
            .iter_mut()
            .find(|f| f.matches_statement(relation, kind))?;
        fault.fire();
        let backend = self
            .catalog
            .read()
            .table(relation)
            .map(|t| t.backend.clone())
            .unwrap_or_else(|_| relation.schema().to_string());
        let error = StoreError::backend_unavailable(backend, fault.text());
        faults.retain(|f| !f.exhausted());
        Some(error)
    }

    /// Return the injected commit failure message, if any fault matches.
    pub fn commit_fault(&self) -> Option<String> {
        let mut faults = self.faults.lock();
        let fault = faults.iter_mut().find(|f| f.matches_commit())?;
        fault.fire();
        let message = fault.text().to_string();
        faults.retain(|f| !f.exhausted());
        Some(message)
    }
}

/// In-memory federation endpoint.
///
/// Cheap to clone; clones share the same backends.
#[derive(Debug, Clone)]
pub struct Federation {
    shared: Arc<Shared>,
}

impl Federation {
    pub fn builder() -> FederationBuilder {
        FederationBuilder::new()
    }

    /// Inject a fault.
    pub fn inject(&self, fault: Fault) {
        self.shared.faults.lock().push(fault);
    }

    pub fn clear_faults(&self) {
        self.shared.faults.lock().clear();
    }

    /// Load committed rows directly, bypassing transactions.
    pub fn seed(&self, relation: &Relation, rows: Vec<Row>) -> StoreResult<()> {
        let mut catalog = self.shared.catalog.write();
        let table = catalog.table_mut(relation)?;
        for row in rows {
            if let Some(column) = table.descriptor.unknown_column(&row) {
                return Err(StoreError::unknown_column(relation.clone(), column));
            }
            let key = table
                .descriptor
                .key_of(&row)
                .ok_or_else(|| StoreError::MissingKey(relation.clone()))?;
            table.observe_key(&key);
            table.rows.insert(key, row);
        }
        Ok(())
    }

    /// Committed rows of a relation, in key order.
    pub fn committed_rows(&self, relation: &Relation) -> StoreResult<Vec<Row>> {
        let catalog = self.shared.catalog.read();
        Ok(catalog.table(relation)?.rows.values().cloned().collect())
    }

    /// The committed row with the given identity.
    pub fn committed_row(&self, relation: &Relation, key: &Key) -> StoreResult<Option<Row>> {
        let catalog = self.shared.catalog.read();
        Ok(catalog.table(relation)?.rows.get(key).cloned())
    }

    /// Backend that physically holds a relation.
    pub fn backend_of(&self, relation: &Relation) -> StoreResult<String> {
        let catalog = self.shared.catalog.read();
        Ok(catalog.table(relation)?.backend.clone())
    }

    pub fn relations(&self) -> Vec<Relation> {
        let catalog = self.shared.catalog.read();
        let mut relations: Vec<Relation> = catalog.relations().cloned().collect();
        relations.sort();
        relations
    }

    pub fn stats(&self) -> FederationStats {
        let c = &self.shared.counters;
        FederationStats {
            connections: c.connections.load(Ordering::SeqCst),
            begins: c.begins.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
            statements: c.statements.load(Ordering::SeqCst),
        }
    }

    /// Open a connection without going through the [`Endpoint`] trait object.
    pub fn open(&self, credentials: &Credentials) -> StoreResult<MemoryConnection> {
        if credentials != &self.shared.credentials {
            return Err(StoreError::AuthenticationFailed(credentials.username.clone()));
        }
        let id = ConnectionId::new(self.shared.next_connection.fetch_add(1, Ordering::SeqCst));
        self.shared.counters.connections.fetch_add(1, Ordering::SeqCst);
        debug!(connection = %id, address = %self.shared.address, "opened federation connection");
        Ok(MemoryConnection::new(id, Arc::clone(&self.shared)))
    }
}

impl Endpoint for Federation {
    fn connect(&self, credentials: &Credentials) -> StoreResult<Box<dyn PhysicalConnection>> {
        Ok(Box::new(self.open(credentials)?))
    }

    fn address(&self) -> String {
        self.shared.address.clone()
    }
}

/// Builder for [`Federation`].
#[derive(Debug)]
pub struct FederationBuilder {
    address: String,
    credentials: Credentials,
    tables: Vec<(String, TableDescriptor)>,
}

impl Default for FederationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FederationBuilder {
    pub fn new() -> Self {
        Self {
            address: "memory://federation".to_string(),
            credentials: Credentials::new("sa", "sa"),
            tables: Vec::new(),
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Register a relation on a backend.
    pub fn table(mut self, backend: impl Into<String>, descriptor: TableDescriptor) -> Self {
        self.tables.push((backend.into(), descriptor));
        self
    }

    pub fn build(self) -> StoreResult<Federation> {
        let mut catalog = Catalog::new();
        for (backend, descriptor) in self.tables {
            catalog.register(&backend, descriptor)?;
        }
        Ok(Federation {
            shared: Arc::new(Shared {
                catalog: RwLock::new(catalog),
                faults: Mutex::new(Vec::new()),
                counters: Counters::default(),
                credentials: self.credentials,
                address: self.address,
                next_connection: AtomicU64::new(1),
            }),
        })
    }
}

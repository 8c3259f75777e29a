//! Interface of the federation endpoint.
//!
//! The endpoint is a black box that routes statements to heterogeneous
//! physical backends. FedTx only sees one logical connection per transaction.

use crate::{
    ConnectionId, IsolationLevel, Key, Relation, Statement, StatementResult, StoreResult,
    TableDescriptor,
};

/// Credentials presented when opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A physical connection to the federation endpoint.
pub trait PhysicalConnection: Send {
    fn id(&self) -> ConnectionId;

    fn set_auto_commit(&mut self, enabled: bool) -> StoreResult<()>;

    fn set_isolation(&mut self, level: IsolationLevel) -> StoreResult<()>;

    /// Open a physical transaction.
    fn begin(&mut self) -> StoreResult<()>;

    /// Publish this connection's writes and close the transaction.
    fn commit(&mut self) -> StoreResult<()>;

    /// Discard this connection's writes and close the transaction.
    fn rollback(&mut self) -> StoreResult<()>;

    fn execute(&mut self, statement: &Statement) -> StoreResult<StatementResult>;

    /// Describe a relation (key column, columns, key generation).
    fn describe(&mut self, relation: &Relation) -> StoreResult<TableDescriptor>;

    /// Reserve the next generated key of a relation. Not transactional:
    /// a reserved key is never handed out again, even after rollback.
    fn next_key(&mut self, relation: &Relation) -> StoreResult<Key>;

    fn in_transaction(&self) -> bool;

    fn is_valid(&self) -> bool;

    fn close(&mut self);
}

/// Something that opens physical connections.
pub trait Endpoint: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> StoreResult<Box<dyn PhysicalConnection>>;

    /// Human-readable address, for logs.
    fn address(&self) -> String;
}

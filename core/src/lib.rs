//! FedTx Core Types
//!
//! This crate provides the foundational types shared by every FedTx component:
//! - Identity types (TxnId, ConnectionId, ScopeToken)
//! - Value types (the Value enum, row keys, rows)
//! - Relations, table descriptors and typed statements
//! - Connection-level settings (isolation level, visibility strategy)
//! - The interface of the federation endpoint (Endpoint, PhysicalConnection)
//! - Common store error types

mod connection;
mod error;
mod id;
mod row;
mod settings;
mod statement;
mod value;

pub use connection::*;
pub use error::*;
pub use id::*;
pub use row::*;
pub use settings::*;
pub use statement::*;
pub use value::*;

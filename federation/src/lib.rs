//! FedTx Federation
//!
//! In-memory federation endpoint.
//!
//! Responsibilities:
//! - Hold tables for several named backends (runtime, history, orders, ...)
//! - Route every statement of one logical connection to the owning backend
//! - Provide read-committed physical transactions spanning all backends
//! - Inject faults and count physical begins/commits/rollbacks for tests

mod catalog;
mod connection;
mod endpoint;
mod fault;

pub use catalog::BackendName;
pub use connection::MemoryConnection;
pub use endpoint::{Federation, FederationBuilder, FederationStats};
pub use fault::Fault;

//! FedTx Pool
//!
//! Connection Provider for the federation endpoint.
//!
//! Responsibilities:
//! - Hand out logical connections (autocommit off, read committed)
//! - Bound the number of physical connections and block callers up to a timeout
//! - Keep a minimum of idle connections and evict the ones idle for too long
//! - Count acquisitions and releases

mod config;
mod error;
mod pool;

pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use pool::{ConnectionPool, ConnectionProvider, LogicalConnection, PoolStats};

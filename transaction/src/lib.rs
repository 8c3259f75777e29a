//! FedTx Transaction
//!
//! Transaction-boundary coordination over one logical connection.
//!
//! Responsibilities:
//! - Begin a transaction for a scope, or join the one already active there
//! - Let only the owning participant physically commit or roll back
//! - Route statements through the configured visibility strategy
//! - Buffer deferred writes and overlay them on reads of the same transaction
//! - Flush buffered writes in issuance order on commit, discard them on rollback
//! - Report transactions left open for too long

mod buffer;
mod context;
mod coordinator;
mod error;
mod guard;
mod overlay;
mod registry;
mod strategy;

pub use buffer::{PendingOperation, SoftTransactionBuffer};
pub use context::TransactionContext;
pub use coordinator::{Outcome, TransactionCoordinator};
pub use error::{TransactionError, TransactionResult};
pub use guard::UnitOfWork;
pub use overlay::merge_overlay;
pub use registry::{ContextRegistry, RegistryEntry};

//! FedTx Orders
//!
//! Order fulfilment sample running a process engine and its business
//! delegates on one federated transaction.
//!
//! Responsibilities:
//! - Describe the federated schema (runtime, history, orders, inventory, payments, issues)
//! - Run process definitions step by step inside one unit of work
//! - Map orders, items, inventory, payments and issues to rows
//! - Provide the order delegates (validate, create, reserve, pay, check, report, confirm)

pub mod delegate;
mod engine;
mod error;
mod model;
pub mod schema;

pub use delegate::{order_process, ORDER_PROCESS};
pub use engine::{
    Delegate, Execution, ProcessDefinition, ProcessEngine, ProcessInstance, ProcessOutcome, Tx, Variables,
};
pub use error::{DelegateError, DelegateResult, OrdersError, OrdersResult};
pub use model::{Inventory, Order, OrderIssue, OrderItem, Payment};

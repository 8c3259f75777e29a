//! Order fulfilment delegates.
//!
//! Each delegate runs its reads and writes through [`Execution::transaction`],
//! joining the process instance's transaction. Business errors are raised
//! outside that closure so the shared transaction stays committable.

use tracing::debug;

use crate::engine::{Delegate, Execution, ProcessDefinition};
use crate::error::{DelegateError, DelegateResult};
use crate::model::{Inventory, Order, OrderIssue, OrderItem, Payment};

/// Key of the order fulfilment process.
pub const ORDER_PROCESS: &str = "order-fulfilment";

pub const DEFAULT_CURRENCY: &str = "EUR";

/// Error code raised when an order is flagged to fail as a business error.
pub const MUST_FAIL: &str = "MUST_FAIL";

/// The order fulfilment process: validate, create, reserve, pay, check,
/// confirm. Business errors are reported as order issues.
pub fn order_process() -> ProcessDefinition {
    ProcessDefinition::new(ORDER_PROCESS)
        .activity(ValidateOrder)
        .activity(CreateOrder)
        .activity(ReserveInventory)
        .activity(ProcessPayment)
        .activity(SendContinuationMessage)
        .activity(ConfirmOrder)
        .on_business_error(ReportFailure)
}

fn required_int(execution: &Execution<'_>, name: &str) -> DelegateResult<i64> {
    execution
        .int(name)
        .ok_or_else(|| DelegateError::technical(format!("missing variable '{}'", name)))
}

fn required_string(execution: &Execution<'_>, name: &str) -> DelegateResult<String> {
    execution
        .string(name)
        .map(str::to_string)
        .ok_or_else(|| DelegateError::technical(format!("missing variable '{}'", name)))
}

/// Rejects orders without customer, SKU or a positive quantity.
pub struct ValidateOrder;

impl Delegate for ValidateOrder {
    fn name(&self) -> &str {
        "validate-order"
    }

    fn execute(&self, execution: &mut Execution<'_>) -> DelegateResult<()> {
        let valid = execution.int("customer").is_some()
            && execution.string("sku").is_some()
            && execution.int("qty").is_some_and(|qty| qty > 0);
        if !valid {
            return Err(DelegateError::technical("invalid order input"));
        }
        Ok(())
    }
}

/// Inserts the order and its single item.
///
/// Sets `orderId`, `totalAmount` and `orderCurrency`.
pub struct CreateOrder;

impl Delegate for CreateOrder {
    fn name(&self) -> &str {
        "create-order"
    }

    fn execute(&self, execution: &mut Execution<'_>) -> DelegateResult<()> {
        let customer = required_int(execution, "customer")?;
        let sku = required_string(execution, "sku")?;
        let quantity = required_int(execution, "qty")?;
        let unit_price = required_int(execution, "unitPrice")?;
        let currency = execution
            .string("currency")
            .unwrap_or(DEFAULT_CURRENCY)
            .to_string();
        let total = unit_price * quantity;

        let order_id = execution.transaction(|tx| {
            let order_id = Order::new(customer, total, currency.as_str()).insert(tx)?;
            OrderItem {
                id: None,
                order_id,
                sku,
                quantity,
                unit_price,
            }
            .insert(tx)?;
            Ok(order_id)
        })?;

        debug!(order = order_id, total, currency = %currency, "order created");
        execution.set_variable("orderId", order_id);
        execution.set_variable("totalAmount", total);
        execution.set_variable("orderCurrency", currency);
        Ok(())
    }
}

/// Reserves the ordered quantity.
pub struct ReserveInventory;

impl Delegate for ReserveInventory {
    fn name(&self) -> &str {
        "reserve-inventory"
    }

    fn execute(&self, execution: &mut Execution<'_>) -> DelegateResult<()> {
        let sku = required_string(execution, "sku")?;
        let quantity = required_int(execution, "qty")?;
        execution.transaction(|tx| Inventory::reserve(tx, &sku, quantity))
    }
}

/// Records a pending payment for the order total.
pub struct ProcessPayment;

impl Delegate for ProcessPayment {
    fn name(&self) -> &str {
        "process-payment"
    }

    fn execute(&self, execution: &mut Execution<'_>) -> DelegateResult<()> {
        let order_id = required_int(execution, "orderId")?;
        let amount = required_int(execution, "totalAmount")?;
        let currency = execution
            .string("orderCurrency")
            .unwrap_or(DEFAULT_CURRENCY)
            .to_string();
        debug!(order = order_id, amount, "registering payment");
        execution.transaction(|tx| Payment::pending(order_id, amount, currency).insert(tx))
    }
}

/// Checks that the order, its items and its payment are visible, then
/// fails on request.
///
/// `mustFailBusiness` raises a [`MUST_FAIL`] business error;
/// `mustFailTechnically` raises a technical one.
pub struct SendContinuationMessage;

impl Delegate for SendContinuationMessage {
    fn name(&self) -> &str {
        "send-continuation-message"
    }

    fn execute(&self, execution: &mut Execution<'_>) -> DelegateResult<()> {
        let order_id = required_int(execution, "orderId")?;
        execution.transaction(|tx| {
            if Order::find(tx, order_id)?.is_none() {
                return Err(DelegateError::technical("order not registered"));
            }
            if OrderItem::find_by_order(tx, order_id)?.is_empty() {
                return Err(DelegateError::technical("order items not registered"));
            }
            if Payment::find(tx, order_id)?.is_none() {
                return Err(DelegateError::technical("payment not registered"));
            }
            Ok(())
        })?;

        if execution.flag("mustFailBusiness") {
            execution.set_variable("errorCode", MUST_FAIL);
            execution.set_variable("errorMessage", "Marked for business error.");
            return Err(DelegateError::business(MUST_FAIL, "Marked for business error."));
        }
        if execution.flag("mustFailTechnically") {
            return Err(DelegateError::technical("forced technical error"));
        }

        debug!(order = order_id, "sending message to notifiers");
        Ok(())
    }
}

/// Ships the reserved stock and marks the order processed.
pub struct ConfirmOrder;

impl Delegate for ConfirmOrder {
    fn name(&self) -> &str {
        "confirm-order"
    }

    fn execute(&self, execution: &mut Execution<'_>) -> DelegateResult<()> {
        let sku = required_string(execution, "sku")?;
        let quantity = required_int(execution, "qty")?;
        let order_id = required_int(execution, "orderId")?;
        execution.transaction(|tx| {
            Inventory::release(tx, &sku, quantity)?;
            Order::confirm(tx, order_id)
        })
    }
}

/// Records an order issue from `errorCode` and `errorMessage`.
pub struct ReportFailure;

impl Delegate for ReportFailure {
    fn name(&self) -> &str {
        "report-failure"
    }

    fn execute(&self, execution: &mut Execution<'_>) -> DelegateResult<()> {
        let issue = OrderIssue {
            id: i64::from(rand::random::<u32>()),
            order_id: execution.int("orderId"),
            error_code: execution.string("errorCode").unwrap_or("UNKNOWN").to_string(),
            error_message: execution
                .string("errorMessage")
                .unwrap_or("Unknown error")
                .to_string(),
            severity: "HIGH".to_string(),
            timestamp: crate::engine::now_millis(),
        };
        debug!(issue = issue.id, code = %issue.error_code, "reporting order failure");
        execution.transaction(|tx| issue.insert(tx))
    }
}

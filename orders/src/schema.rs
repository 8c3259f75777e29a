//! Federated schema of the order sample.
//!
//! Process engine tables live on the `runtime` and `history` backends, the
//! business tables on `orders`, `inventory`, `payments` and `issues`. One
//! logical connection reaches all of them.

use fedtx_core::{row, Credentials, Relation, StoreResult, TableDescriptor};
use fedtx_federation::Federation;

pub fn execution() -> Relation {
    Relation::new("runtime", "ACT_RU_EXECUTION")
}

pub fn process_instance_history() -> Relation {
    Relation::new("history", "ACT_HI_PROCINST")
}

pub fn activity_history() -> Relation {
    Relation::new("history", "ACT_HI_ACTINST")
}

pub fn variable_history() -> Relation {
    Relation::new("history", "ACT_HI_VARINST")
}

pub fn orders() -> Relation {
    Relation::new("orders", "ORDERS")
}

pub fn order_items() -> Relation {
    Relation::new("orders", "ORDER_ITEMS")
}

pub fn inventory() -> Relation {
    Relation::new("inventory", "INVENTORY")
}

pub fn payments() -> Relation {
    Relation::new("payments", "PAYMENT")
}

pub fn order_issues() -> Relation {
    Relation::new("issues", "ORDER_ISSUES")
}

/// Every table with the backend that holds it.
pub fn tables() -> Vec<(&'static str, TableDescriptor)> {
    vec![
        (
            "runtime",
            TableDescriptor::new(execution(), "ID_")
                .columns(["PROC_DEF_KEY_", "ACT_ID_", "START_TIME_"])
                .generated(),
        ),
        (
            "history",
            TableDescriptor::new(process_instance_history(), "ID_")
                .columns(["PROC_DEF_KEY_", "START_TIME_", "END_TIME_", "STATE_"]),
        ),
        (
            "history",
            TableDescriptor::new(activity_history(), "ID_")
                .columns(["PROC_INST_ID_", "ACT_ID_", "START_TIME_"])
                .generated(),
        ),
        (
            "history",
            TableDescriptor::new(variable_history(), "ID_")
                .columns(["PROC_INST_ID_", "NAME_", "VALUE_"])
                .generated(),
        ),
        (
            "orders",
            TableDescriptor::new(orders(), "ID")
                .columns([
                    "CUSTOMER_ID",
                    "TOTAL_AMOUNT",
                    "CURRENCY",
                    "STATUS",
                    "CREATED_AT",
                    "UPDATED_AT",
                ])
                .generated(),
        ),
        (
            "orders",
            TableDescriptor::new(order_items(), "ID")
                .columns(["ORDER_ID", "SKU", "QUANTITY", "UNIT_PRICE"])
                .generated(),
        ),
        (
            "inventory",
            TableDescriptor::new(inventory(), "SKU").columns(["QUANTITY", "RESERVED", "UPDATED_AT"]),
        ),
        (
            "payments",
            TableDescriptor::new(payments(), "orderId").columns([
                "amount",
                "currency",
                "status",
                "externalTxId",
                "registration",
            ]),
        ),
        (
            "issues",
            TableDescriptor::new(order_issues(), "id").columns([
                "orderId",
                "errorCode",
                "errorMessage",
                "severity",
                "timestamp",
            ]),
        ),
    ]
}

/// Build an in-memory federation holding the whole schema.
pub fn build_federation(address: impl Into<String>, credentials: Credentials) -> StoreResult<Federation> {
    tables()
        .into_iter()
        .fold(
            Federation::builder().address(address).credentials(credentials),
            |builder, (backend, descriptor)| builder.table(backend, descriptor),
        )
        .build()
}

/// Load the stock the sample orders draw from.
pub fn seed_inventory(federation: &Federation) -> StoreResult<()> {
    let stock = (1..=9).map(|n| {
        row! {
            "SKU" => format!("SKU-{:03}", n),
            "QUANTITY" => 100i64,
            "RESERVED" => 0i64,
        }
    });
    federation.seed(&inventory(), stock.collect())
}

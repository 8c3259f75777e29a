//! Business entities and their row mappings.
//!
//! Amounts are integer cents.

use fedtx_core::{row, Assignment, Filter, Key, Row, Statement, Value};

use crate::engine::{now_millis, Tx};
use crate::error::{DelegateError, DelegateResult};
use crate::schema;

fn int(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(Value::as_int)
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(Value::as_str).map(str::to_string)
}

fn timestamp(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(Value::as_timestamp)
}

fn generated_id(result: &fedtx_core::StatementResult, what: &str) -> DelegateResult<i64> {
    result
        .inserted_key()
        .and_then(Key::as_int)
        .ok_or_else(|| DelegateError::technical(format!("{} insert returned no generated id", what)))
}

/// A customer order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Generated on insert.
    pub id: Option<i64>,
    pub customer_id: i64,
    pub total_amount: i64,
    pub currency: String,
    pub status: String,
    pub created_at: i64,
}

impl Order {
    pub fn new(customer_id: i64, total_amount: i64, currency: impl Into<String>) -> Self {
        Self {
            id: None,
            customer_id,
            total_amount,
            currency: currency.into(),
            status: "CREATED".to_string(),
            created_at: now_millis(),
        }
    }

    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: int(row, "ID"),
            customer_id: int(row, "CUSTOMER_ID")?,
            total_amount: int(row, "TOTAL_AMOUNT")?,
            currency: text(row, "CURRENCY")?,
            status: text(row, "STATUS")?,
            created_at: timestamp(row, "CREATED_AT").unwrap_or_default(),
        })
    }

    fn to_row(&self) -> Row {
        let mut row = row! {
            "CUSTOMER_ID" => self.customer_id,
            "TOTAL_AMOUNT" => self.total_amount,
            "CURRENCY" => self.currency.as_str(),
            "STATUS" => self.status.as_str(),
            "CREATED_AT" => Value::Timestamp(self.created_at),
        };
        if let Some(id) = self.id {
            row.insert("ID".to_string(), Value::Int(id));
        }
        row
    }

    /// Insert and return the generated id.
    pub fn insert(&self, tx: &Tx<'_>) -> DelegateResult<i64> {
        let result = tx.issue(&Statement::insert(schema::orders(), self.to_row()))?;
        generated_id(&result, "order")
    }

    pub fn find(tx: &Tx<'_>, id: i64) -> DelegateResult<Option<Self>> {
        let rows = tx
            .issue(&Statement::select(schema::orders(), Filter::Key(Key::Int(id))))?
            .into_rows();
        Ok(rows.first().and_then(Self::from_row))
    }

    /// Mark the order processed.
    pub fn confirm(tx: &Tx<'_>, id: i64) -> DelegateResult<()> {
        tx.issue(&Statement::update(
            schema::orders(),
            id,
            vec![
                ("STATUS".to_string(), Assignment::Set("PROCESSED".into())),
                ("UPDATED_AT".to_string(), Assignment::Set(Value::Timestamp(now_millis()))),
            ],
        ))?;
        Ok(())
    }
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub id: Option<i64>,
    pub order_id: i64,
    pub sku: String,
    pub quantity: i64,
    pub unit_price: i64,
}

impl OrderItem {
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: int(row, "ID"),
            order_id: int(row, "ORDER_ID")?,
            sku: text(row, "SKU")?,
            quantity: int(row, "QUANTITY")?,
            unit_price: int(row, "UNIT_PRICE")?,
        })
    }

    pub fn insert(&self, tx: &Tx<'_>) -> DelegateResult<i64> {
        let row = row! {
            "ORDER_ID" => self.order_id,
            "SKU" => self.sku.as_str(),
            "QUANTITY" => self.quantity,
            "UNIT_PRICE" => self.unit_price,
        };
        let result = tx.issue(&Statement::insert(schema::order_items(), row))?;
        generated_id(&result, "order item")
    }

    pub fn find_by_order(tx: &Tx<'_>, order_id: i64) -> DelegateResult<Vec<Self>> {
        let rows = tx
            .issue(&Statement::select(
                schema::order_items(),
                Filter::eq("ORDER_ID", order_id),
            ))?
            .into_rows();
        Ok(rows.iter().filter_map(Self::from_row).collect())
    }
}

/// Stock of one SKU.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    pub sku: String,
    pub quantity: i64,
    pub reserved: i64,
}

impl Inventory {
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            sku: text(row, "SKU")?,
            quantity: int(row, "QUANTITY").unwrap_or_default(),
            reserved: int(row, "RESERVED").unwrap_or_default(),
        })
    }

    pub fn find(tx: &Tx<'_>, sku: &str) -> DelegateResult<Option<Self>> {
        let rows = tx
            .issue(&Statement::select(schema::inventory(), Filter::Key(Key::from(sku))))?
            .into_rows();
        Ok(rows.first().and_then(Self::from_row))
    }

    fn require(tx: &Tx<'_>, sku: &str) -> DelegateResult<Self> {
        Self::find(tx, sku)?
            .ok_or_else(|| DelegateError::technical(format!("unknown SKU '{}'", sku)))
    }

    /// `reserved = reserved + qty`
    pub fn reserve(tx: &Tx<'_>, sku: &str, qty: i64) -> DelegateResult<()> {
        Self::require(tx, sku)?;
        tx.issue(&Statement::update(
            schema::inventory(),
            sku,
            vec![
                ("RESERVED".to_string(), Assignment::Add(qty)),
                ("UPDATED_AT".to_string(), Assignment::Set(Value::Timestamp(now_millis()))),
            ],
        ))?;
        Ok(())
    }

    /// Ship reserved stock: `reserved = reserved - qty, quantity = quantity - qty`
    pub fn release(tx: &Tx<'_>, sku: &str, qty: i64) -> DelegateResult<()> {
        Self::require(tx, sku)?;
        tx.issue(&Statement::update(
            schema::inventory(),
            sku,
            vec![
                ("RESERVED".to_string(), Assignment::Add(-qty)),
                ("QUANTITY".to_string(), Assignment::Add(-qty)),
                ("UPDATED_AT".to_string(), Assignment::Set(Value::Timestamp(now_millis()))),
            ],
        ))?;
        Ok(())
    }
}

/// Payment of an order, keyed by the order id.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub order_id: i64,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub external_tx_id: Option<String>,
    pub registration: i64,
}

impl Payment {
    pub fn pending(order_id: i64, amount: i64, currency: impl Into<String>) -> Self {
        Self {
            order_id,
            amount,
            currency: currency.into(),
            status: "PENDING".to_string(),
            external_tx_id: None,
            registration: now_millis(),
        }
    }

    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            order_id: int(row, "orderId")?,
            amount: int(row, "amount")?,
            currency: text(row, "currency")?,
            status: text(row, "status")?,
            external_tx_id: text(row, "externalTxId"),
            registration: timestamp(row, "registration").unwrap_or_default(),
        })
    }

    pub fn insert(&self, tx: &Tx<'_>) -> DelegateResult<()> {
        let mut row = row! {
            "orderId" => self.order_id,
            "amount" => self.amount,
            "currency" => self.currency.as_str(),
            "status" => self.status.as_str(),
            "registration" => Value::Timestamp(self.registration),
        };
        if let Some(external) = &self.external_tx_id {
            row.insert("externalTxId".to_string(), Value::from(external.as_str()));
        }
        tx.issue(&Statement::insert(schema::payments(), row))?;
        Ok(())
    }

    pub fn find(tx: &Tx<'_>, order_id: i64) -> DelegateResult<Option<Self>> {
        let rows = tx
            .issue(&Statement::select(schema::payments(), Filter::Key(Key::Int(order_id))))?
            .into_rows();
        Ok(rows.first().and_then(Self::from_row))
    }
}

/// A problem recorded against an order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIssue {
    pub id: i64,
    pub order_id: Option<i64>,
    pub error_code: String,
    pub error_message: String,
    pub severity: String,
    pub timestamp: i64,
}

impl OrderIssue {
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: int(row, "id")?,
            order_id: int(row, "orderId"),
            error_code: text(row, "errorCode")?,
            error_message: text(row, "errorMessage")?,
            severity: text(row, "severity")?,
            timestamp: timestamp(row, "timestamp").unwrap_or_default(),
        })
    }

    pub fn insert(&self, tx: &Tx<'_>) -> DelegateResult<()> {
        let mut row = row! {
            "id" => self.id,
            "errorCode" => self.error_code.as_str(),
            "errorMessage" => self.error_message.as_str(),
            "severity" => self.severity.as_str(),
            "timestamp" => Value::Timestamp(self.timestamp),
        };
        if let Some(order_id) = self.order_id {
            row.insert("orderId".to_string(), Value::Int(order_id));
        }
        tx.issue(&Statement::insert(schema::order_issues(), row))?;
        Ok(())
    }

    pub fn find_by_order(tx: &Tx<'_>, order_id: i64) -> DelegateResult<Vec<Self>> {
        let rows = tx
            .issue(&Statement::select(
                schema::order_issues(),
                Filter::eq("orderId", order_id),
            ))?
            .into_rows();
        Ok(rows.iter().filter_map(Self::from_row).collect())
    }
}

//! Typed statements issued against the federation endpoint.

use std::fmt;

use crate::{Key, Relation, Row, Seq, StoreError, StoreResult, Value};

/// Kind of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
    Select,
}

impl StatementKind {
    /// Returns true for insert, update and delete.
    pub fn is_write(&self) -> bool {
        !matches!(self, StatementKind::Select)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Select => "SELECT",
        };
        f.write_str(name)
    }
}

/// Right-hand side of an UPDATE column assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `column = value`
    Set(Value),
    /// `column = column + delta` (Int columns only).
    Add(i64),
}

impl Assignment {
    /// Apply this assignment to `column` of `row`.
    pub fn apply(&self, row: &mut Row, column: &str) -> StoreResult<()> {
        match self {
            Assignment::Set(value) => {
                row.insert(column.to_string(), value.clone());
            }
            Assignment::Add(delta) => {
                let current = match row.get(column) {
                    Some(Value::Int(i)) => *i,
                    Some(Value::Null) | None => 0,
                    Some(other) => {
                        return Err(StoreError::type_mismatch(column, "Int", other.type_name()));
                    }
                };
                row.insert(column.to_string(), Value::Int(current + delta));
            }
        }
        Ok(())
    }
}

/// Apply a whole SET list to a row.
pub fn apply_assignments(row: &mut Row, set: &[(String, Assignment)]) -> StoreResult<()> {
    for (column, assignment) in set {
        assignment.apply(row, column)?;
    }
    Ok(())
}

/// Row filter of a SELECT.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every row.
    All,
    /// The row with this identity.
    Key(Key),
    /// Rows whose column equals the value.
    Eq { column: String, value: Value },
    /// Rows matching every sub-filter.
    And(Vec<Filter>),
}

impl Filter {
    /// Equality filter on a column.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Check a row against the filter. `key_column` names the identity column.
    pub fn matches(&self, row: &Row, key_column: &str) -> bool {
        match self {
            Filter::All => true,
            Filter::Key(key) => row.get(key_column).and_then(Value::as_key).as_ref() == Some(key),
            Filter::Eq { column, value } => row.get(column) == Some(value),
            Filter::And(filters) => filters.iter().all(|f| f.matches(row, key_column)),
        }
    }

    /// Columns referenced by the filter.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Filter::All | Filter::Key(_) => Vec::new(),
            Filter::Eq { column, .. } => vec![column.as_str()],
            Filter::And(filters) => filters.iter().flat_map(Filter::columns).collect(),
        }
    }
}

/// A statement against one relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Insert a row. A generated key column may be omitted.
    Insert { relation: Relation, row: Row },
    /// Update the row with the given identity.
    Update {
        relation: Relation,
        key: Key,
        set: Vec<(String, Assignment)>,
    },
    /// Delete the row with the given identity.
    Delete { relation: Relation, key: Key },
    /// Read rows.
    Select { relation: Relation, filter: Filter },
}

impl Statement {
    pub fn insert(relation: Relation, row: Row) -> Self {
        Statement::Insert { relation, row }
    }

    pub fn update(relation: Relation, key: impl Into<Key>, set: Vec<(String, Assignment)>) -> Self {
        Statement::Update {
            relation,
            key: key.into(),
            set,
        }
    }

    pub fn delete(relation: Relation, key: impl Into<Key>) -> Self {
        Statement::Delete {
            relation,
            key: key.into(),
        }
    }

    pub fn select(relation: Relation, filter: Filter) -> Self {
        Statement::Select { relation, filter }
    }

    /// The relation the statement targets.
    pub fn relation(&self) -> &Relation {
        match self {
            Statement::Insert { relation, .. }
            | Statement::Update { relation, .. }
            | Statement::Delete { relation, .. }
            | Statement::Select { relation, .. } => relation,
        }
    }

    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Insert { .. } => StatementKind::Insert,
            Statement::Update { .. } => StatementKind::Update,
            Statement::Delete { .. } => StatementKind::Delete,
            Statement::Select { .. } => StatementKind::Select,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Insert { relation, row } => {
                write!(f, "INSERT INTO {} ({} columns)", relation, row.len())
            }
            Statement::Update { relation, key, set } => {
                write!(f, "UPDATE {} SET {} columns WHERE key = {}", relation, set.len(), key)
            }
            Statement::Delete { relation, key } => {
                write!(f, "DELETE FROM {} WHERE key = {}", relation, key)
            }
            Statement::Select { relation, .. } => write!(f, "SELECT FROM {}", relation),
        }
    }
}

/// Result of executing a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    /// A row was inserted (or accepted for insertion) with this identity.
    Inserted { key: Key },
    /// Rows affected by an applied update/delete.
    Affected(u64),
    /// A write was accepted into the soft-transaction buffer for the row
    /// with this identity.
    Buffered { seq: Seq, key: Key },
    /// Rows returned by a select.
    Rows(Vec<Row>),
}

impl StatementResult {
    /// Consume into the returned rows (empty for writes).
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            StatementResult::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    /// Identity of the written row: the inserted key, or the key a buffered
    /// write targets.
    pub fn inserted_key(&self) -> Option<&Key> {
        match self {
            StatementResult::Inserted { key } | StatementResult::Buffered { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Rows affected by an applied write. Buffered writes report 0.
    pub fn affected(&self) -> u64 {
        match self {
            StatementResult::Inserted { .. } => 1,
            StatementResult::Affected(n) => *n,
            StatementResult::Buffered { .. } | StatementResult::Rows(_) => 0,
        }
    }
}

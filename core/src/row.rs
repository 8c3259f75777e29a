//! Rows, relations and table descriptors.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{Key, StoreError, StoreResult, Value};

/// Type alias for row storage (column name -> value).
pub type Row = BTreeMap<String, Value>;

/// Helper macro to create rows.
#[macro_export]
macro_rules! row {
    () => {
        std::collections::BTreeMap::<String, $crate::Value>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        {
            let mut map = std::collections::BTreeMap::<String, $crate::Value>::new();
            $(
                map.insert($key.to_string(), $crate::Value::from($value));
            )+
            map
        }
    };
}

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// A qualified relation name (`schema.TABLE`).
///
/// The schema selects the backend that physically holds the table; callers
/// only ever see the qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Relation {
    schema: String,
    table: String,
}

impl Relation {
    /// Create a relation without validating its identifiers.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Parse and validate a `schema.TABLE` name.
    pub fn parse(qualified: &str) -> StoreResult<Self> {
        let (schema, table) = qualified
            .split_once('.')
            .ok_or_else(|| StoreError::invalid_relation(qualified, "expected schema.TABLE"))?;
        let relation = Self::new(schema, table);
        relation.validate()?;
        Ok(relation)
    }

    /// Check both identifiers against the identifier grammar.
    pub fn validate(&self) -> StoreResult<()> {
        let re = regex_lite::Regex::new(IDENTIFIER_PATTERN)
            .map_err(|e| StoreError::invalid_relation(self.to_string(), e.to_string()))?;
        for part in [&self.schema, &self.table] {
            if !re.is_match(part) {
                return Err(StoreError::invalid_relation(
                    self.to_string(),
                    format!("invalid identifier '{}'", part),
                ));
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Shape of a relation as exposed by the federation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    /// The relation described.
    pub relation: Relation,
    /// Column holding the row identity.
    pub key_column: String,
    /// All known columns (including the key column).
    pub columns: BTreeSet<String>,
    /// Whether the endpoint generates keys for inserts that omit them.
    pub generated_key: bool,
}

impl TableDescriptor {
    /// Create a descriptor whose only column is the key column.
    pub fn new(relation: Relation, key_column: impl Into<String>) -> Self {
        let key_column = key_column.into();
        let mut columns = BTreeSet::new();
        columns.insert(key_column.clone());
        Self {
            relation,
            key_column,
            columns,
            generated_key: false,
        }
    }

    /// Add a column.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.insert(name.into());
        self
    }

    /// Add several columns.
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(names.into_iter().map(Into::into));
        self
    }

    /// Let the endpoint generate keys.
    pub fn generated(mut self) -> Self {
        self.generated_key = true;
        self
    }

    /// Extract the identity of a row, if the key column is present.
    pub fn key_of(&self, row: &Row) -> Option<Key> {
        row.get(&self.key_column).and_then(Value::as_key)
    }

    /// Return the first column of `row` the relation does not know.
    pub fn unknown_column<'r>(&self, row: &'r Row) -> Option<&'r str> {
        row.keys()
            .map(String::as_str)
            .find(|column| !self.columns.contains(*column))
    }
}

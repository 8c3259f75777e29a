//! Assertions on committed federation state and on errors.

use std::fmt::Display;

use fedtx_core::{Key, Relation, Row, Value};
use fedtx_federation::Federation;

use crate::error::{CheckError, CheckResult};

/// Expectations on the committed rows of one relation.
///
/// ```ignore
/// TableCheck::new(&federation, schema::orders())
///     .rows(1)
///     .value(Key::Int(1), "STATUS", "PROCESSED")
///     .verify()?;
/// ```
#[derive(Debug)]
pub struct TableCheck<'f> {
    federation: &'f Federation,
    relation: Relation,
    rows: Option<usize>,
    contains: Vec<Row>,
    values: Vec<(Key, String, Value)>,
    absent: Vec<Key>,
}

impl<'f> TableCheck<'f> {
    pub fn new(federation: &'f Federation, relation: Relation) -> Self {
        Self {
            federation,
            relation,
            rows: None,
            contains: Vec::new(),
            values: Vec::new(),
            absent: Vec::new(),
        }
    }

    /// Exactly `n` committed rows.
    pub fn rows(mut self, n: usize) -> Self {
        self.rows = Some(n);
        self
    }

    pub fn empty(self) -> Self {
        self.rows(0)
    }

    /// Some committed row holds at least these columns with these values.
    pub fn contains(mut self, row: Row) -> Self {
        self.contains.push(row);
        self
    }

    /// The row under `key` holds `value` in `column`.
    pub fn value(mut self, key: impl Into<Key>, column: &str, value: impl Into<Value>) -> Self {
        self.values.push((key.into(), column.to_string(), value.into()));
        self
    }

    /// No committed row under `key`.
    pub fn absent(mut self, key: impl Into<Key>) -> Self {
        self.absent.push(key.into());
        self
    }

    pub fn verify(&self) -> CheckResult<()> {
        let committed = self.federation.committed_rows(&self.relation)?;

        if let Some(expected) = self.rows {
            if committed.len() != expected {
                return Err(self.fail(format!("expected {} rows, found {}", expected, committed.len())));
            }
        }

        for wanted in &self.contains {
            let found = committed
                .iter()
                .any(|row| wanted.iter().all(|(column, value)| row.get(column) == Some(value)));
            if !found {
                return Err(self.fail(format!("no row contains {:?}", wanted)));
            }
        }

        for (key, column, expected) in &self.values {
            let row = self
                .federation
                .committed_row(&self.relation, key)?
                .ok_or_else(|| self.fail(format!("no row under key {}", key)))?;
            let actual = row.get(column).cloned().unwrap_or(Value::Null);
            if &actual != expected {
                return Err(self.fail(format!("{}.{}: expected {}, found {}", key, column, expected, actual)));
            }
        }

        for key in &self.absent {
            if self.federation.committed_row(&self.relation, key)?.is_some() {
                return Err(self.fail(format!("row under key {} should not exist", key)));
            }
        }
        Ok(())
    }

    fn fail(&self, message: String) -> CheckError {
        CheckError::table_mismatch(&self.relation, message)
    }
}

/// Check that `result` failed with a message matching `pattern`.
pub fn expect_error<T, E: Display>(result: &Result<T, E>, pattern: &str) -> CheckResult<()> {
    let re = regex_lite::Regex::new(pattern).map_err(|e| CheckError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    match result {
        Err(e) if re.is_match(&e.to_string()) => Ok(()),
        Err(e) => Err(CheckError::ErrorMismatch {
            pattern: pattern.to_string(),
            actual: format!("got: {}", e),
        }),
        Ok(_) => Err(CheckError::ErrorMismatch {
            pattern: pattern.to_string(),
            actual: "but the operation succeeded".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedtx_core::{row, TableDescriptor};

    fn federation() -> Federation {
        let relation = Relation::new("runtime", "ACT_RU_TASK");
        let federation = Federation::builder()
            .table("runtime", TableDescriptor::new(relation.clone(), "ID_").column("NAME_"))
            .build()
            .unwrap();
        federation
            .seed(&relation, vec![row! { "ID_" => "t1", "NAME_" => "approve" }])
            .unwrap();
        federation
    }

    #[test]
    fn test_table_check_passes() {
        let federation = federation();
        TableCheck::new(&federation, Relation::new("runtime", "ACT_RU_TASK"))
            .rows(1)
            .contains(row! { "NAME_" => "approve" })
            .value("t1", "NAME_", "approve")
            .absent("t2")
            .verify()
            .unwrap();
    }

    #[test]
    fn test_table_check_reports_mismatch() {
        let federation = federation();
        let result = TableCheck::new(&federation, Relation::new("runtime", "ACT_RU_TASK"))
            .value("t1", "NAME_", "reject")
            .verify();
        expect_error(&result, r"NAME_: expected reject").unwrap();
    }

    #[test]
    fn test_expect_error_on_success() {
        let result: Result<(), String> = Ok(());
        assert!(matches!(
            expect_error(&result, "boom"),
            Err(CheckError::ErrorMismatch { .. })
        ));
    }
}

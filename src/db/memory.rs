/// In-process backing store.
///
/// Evaluates the compiled predicate tree directly over stored rows. Used by
/// tests and the `--demo` mode of the CLI; it honours the same contract as
/// the PostgreSQL store (store order, projection, error on unknown tables).
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveDate;

use super::store::{BackingStore, RangeProbe};
use super::value::{CellValue, RawRow};
use crate::error::BackendError;
use crate::model::{
    Comparison, CompiledQuery, OperatorKind, Predicate, ProjectedColumn, Value, DATE_FORMAT,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<RawRow>>,
    delay: Option<Duration>,
    failure: Option<String>,
    executions: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>, rows: Vec<RawRow>) -> Self {
        self.tables.insert(table.into(), rows);
        self
    }

    /// Every call sleeps for `delay` first, ignoring the caller's timeout.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call fails with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Load tables from JSON: `{"table": [{"column": value, ...}, ...]}`.
    /// Strings in `YYYY-MM-DD` form become dates.
    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let parsed: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(content).context("demo data is not a JSON object")?;

        let mut store = Self::new();
        for (table, rows) in parsed {
            let serde_json::Value::Array(rows) = rows else {
                bail!("table `{}` is not an array of rows", table);
            };
            let mut raw_rows = Vec::with_capacity(rows.len());
            for (i, row) in rows.into_iter().enumerate() {
                let serde_json::Value::Object(columns) = row else {
                    bail!("row {} of `{}` is not an object", i, table);
                };
                let mut raw = RawRow::new();
                for (column, value) in columns {
                    raw.push(column, json_cell(value));
                }
                raw_rows.push(raw);
            }
            store = store.with_table(table, raw_rows);
        }
        Ok(store)
    }

    pub fn execution_count(&self) -> usize {
        self.executions.load(AtomicOrdering::SeqCst)
    }

    async fn table(&self, table: &str) -> Result<&[RawRow], BackendError> {
        self.executions.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(BackendError::Connection(message.clone()));
        }
        self.tables
            .get(table)
            .map(Vec::as_slice)
            .ok_or_else(|| BackendError::Query(format!("relation \"{}\" does not exist", table)))
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn execute(
        &self,
        query: &CompiledQuery,
        _timeout: Duration,
    ) -> Result<Vec<RawRow>, BackendError> {
        let rows = self.table(&query.table).await?;
        Ok(rows
            .iter()
            .filter(|row| matches(&query.predicate, row))
            .map(|row| project(row, &query.columns))
            .collect())
    }

    async fn probe_range(
        &self,
        table: &str,
        column: &ProjectedColumn,
        _timeout: Duration,
    ) -> Result<RangeProbe, BackendError> {
        let rows = self.table(table).await?;
        let mut cells = rows
            .iter()
            .filter_map(|row| row.get(&column.name))
            .filter(|cell| !cell.is_null());

        let Some(first) = cells.next() else {
            return Ok((None, None));
        };
        let (mut min, mut max) = (first, first);
        for cell in cells {
            if cell_order(cell, min) == Some(Ordering::Less) {
                min = cell;
            }
            if cell_order(cell, max) == Some(Ordering::Greater) {
                max = cell;
            }
        }
        Ok((Some(min.display()), Some(max.display())))
    }
}

fn json_cell(value: serde_json::Value) -> CellValue {
    match value {
        serde_json::Value::Null => CellValue::Null,
        serde_json::Value::Bool(b) => CellValue::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => CellValue::Int64(i),
            None => n.as_f64().map_or(CellValue::Null, CellValue::Float64),
        },
        serde_json::Value::String(s) => match NaiveDate::parse_from_str(&s, DATE_FORMAT) {
            Ok(date) => CellValue::Date(date),
            Err(_) => CellValue::Text(s),
        },
        other => CellValue::Json(other),
    }
}

fn project(row: &RawRow, columns: &[ProjectedColumn]) -> RawRow {
    let mut projected = RawRow::new();
    for column in columns {
        let value = row.get(&column.name).cloned().unwrap_or(CellValue::Null);
        projected.push(column.name.clone(), value);
    }
    projected
}

/// Evaluate `predicate` against `row` with SQL semantics: any comparison
/// involving NULL is false, except `IS NULL`.
pub fn matches(predicate: &Predicate, row: &RawRow) -> bool {
    match predicate {
        Predicate::Always => true,
        Predicate::Compare(comparison) => {
            let cell = row.get(&comparison.column).unwrap_or(&CellValue::Null);
            compare(comparison, cell)
        }
        Predicate::And(left, right) => matches(left, row) && matches(right, row),
        Predicate::Or(left, right) => matches(left, row) || matches(right, row),
    }
}

fn compare(comparison: &Comparison, cell: &CellValue) -> bool {
    if comparison.operator == OperatorKind::IsNull {
        return cell.is_null();
    }
    if cell.is_null() {
        return false;
    }

    let values = &comparison.values;
    let order = |value: &Value| value_order(cell, value);

    match comparison.operator {
        OperatorKind::Equals => order(&values[0]) == Some(Ordering::Equal),
        OperatorKind::NotEquals => matches!(order(&values[0]), Some(o) if o != Ordering::Equal),
        OperatorKind::GreaterThan => order(&values[0]) == Some(Ordering::Greater),
        OperatorKind::GreaterOrEqual => {
            matches!(order(&values[0]), Some(Ordering::Greater | Ordering::Equal))
        }
        OperatorKind::LessThan => order(&values[0]) == Some(Ordering::Less),
        OperatorKind::LessOrEqual => {
            matches!(order(&values[0]), Some(Ordering::Less | Ordering::Equal))
        }
        OperatorKind::Between => {
            matches!(order(&values[0]), Some(Ordering::Greater | Ordering::Equal))
                && matches!(order(&values[1]), Some(Ordering::Less | Ordering::Equal))
        }
        OperatorKind::In => values
            .iter()
            .any(|value| order(value) == Some(Ordering::Equal)),
        OperatorKind::Contains => match (cell, &values[0]) {
            (CellValue::Text(text), Value::Text(needle)) => text.contains(needle.as_str()),
            _ => false,
        },
        OperatorKind::StartsWith => match (cell, &values[0]) {
            (CellValue::Text(text), Value::Text(prefix)) => text.starts_with(prefix.as_str()),
            _ => false,
        },
        OperatorKind::IsNull => false,
    }
}

/// Order of `cell` relative to `value`, if the two are comparable.
fn value_order(cell: &CellValue, value: &Value) -> Option<Ordering> {
    match value {
        Value::Text(s) => match cell {
            CellValue::Text(t) => Some(t.as_str().cmp(s.as_str())),
            _ => None,
        },
        Value::Integer(i) => match cell.as_i64() {
            Some(c) => Some(c.cmp(i)),
            None => cell.as_f64()?.partial_cmp(&(*i as f64)),
        },
        Value::Decimal(d) => cell.as_f64()?.partial_cmp(d),
        Value::Date(d) => Some(cell.as_date()?.cmp(d)),
        Value::Boolean(b) => match cell {
            CellValue::Bool(c) => Some(c.cmp(b)),
            _ => None,
        },
    }
}

fn cell_order(a: &CellValue, b: &CellValue) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_date(), b.as_date()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (CellValue::Text(x), CellValue::Text(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

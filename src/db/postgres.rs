/// PostgreSQL backing store over a deadpool connection pool.
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{Object, Pool};
use std::error::Error as StdError;
use std::fmt;
use std::time::{Duration, Instant};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{CancelToken, NoTls, Row};

use super::connection::{create_pool, CancelTls, ConnectionConfig};
use super::store::{BackingStore, RangeProbe};
use super::value::{CellValue, RawRow};
use crate::error::BackendError;
use crate::model::{range_probe, to_statement, CompiledQuery, ProjectedColumn, Value};

/// Categorized error types for SQL query failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE class 42 - syntax_error, etc.)
    Syntax,
    /// Semantic errors (missing table/column, ambiguous reference)
    Semantic,
    /// Execution/runtime errors (division by zero, constraint violation)
    Execution,
    /// Transaction state errors (e.g., transaction aborted)
    Transaction,
    /// Connection/communication errors
    Connection,
    /// Unknown or unclassified errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

pub struct PostgresStore {
    pool: Pool,
    cancel_tls: CancelTls,
    target: String,
}

impl PostgresStore {
    pub fn connect(config: &ConnectionConfig) -> anyhow::Result<Self> {
        let (pool, cancel_tls) = create_pool(config)?;
        tracing::info!(
            target_db = %config.display_string(),
            ssl_mode = ?config.ssl_mode,
            pool_size = config.pool_size,
            "configured PostgreSQL store"
        );
        Ok(Self {
            pool,
            cancel_tls,
            target: config.display_string(),
        })
    }

    async fn client(&self, timeout: Duration) -> Result<Object, BackendError> {
        match tokio::time::timeout(timeout, self.pool.get()).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(e)) => Err(BackendError::Connection(format!("{}: {}", self.target, e))),
            Err(_) => Err(BackendError::Timeout(timeout)),
        }
    }

    async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        timeout: Duration,
    ) -> Result<Vec<Row>, BackendError> {
        let start = Instant::now();
        let client = self.client(timeout).await?;
        let remaining = timeout.saturating_sub(start.elapsed());

        let outcome = tokio::time::timeout(remaining, client.query(sql, params)).await;
        match outcome {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(classify(&e)),
            Err(_) => {
                self.cancel(client.cancel_token());
                // The connection is still busy with the abandoned query.
                drop(Object::take(client));
                Err(BackendError::Timeout(timeout))
            }
        }
    }

    /// Best-effort server-side cancel of a timed-out query.
    fn cancel(&self, token: CancelToken) {
        let tls = self.cancel_tls.clone();
        tokio::spawn(async move {
            let result = match tls {
                CancelTls::Plain => token.cancel_query(NoTls).await,
                CancelTls::Tls(connector) => token.cancel_query(connector).await,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to cancel timed-out query");
            }
        });
    }
}

#[async_trait]
impl BackingStore for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn execute(
        &self,
        query: &CompiledQuery,
        timeout: Duration,
    ) -> Result<Vec<RawRow>, BackendError> {
        let statement = to_statement(query);
        tracing::debug!(sql = %statement.text, params = statement.params.len(), "executing");

        let params: Vec<Box<dyn ToSql + Sync + Send>> =
            statement.params.iter().map(to_sql_param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = self.query(&statement.text, &refs, timeout).await?;
        rows.iter().map(to_raw_row).collect()
    }

    async fn probe_range(
        &self,
        table: &str,
        column: &ProjectedColumn,
        timeout: Duration,
    ) -> Result<RangeProbe, BackendError> {
        let sql = range_probe(table, &column.name);
        tracing::debug!(sql = %sql, "probing range");

        let rows = self.query(&sql, &[], timeout).await?;
        let Some(row) = rows.first() else {
            return Ok((None, None));
        };
        let min = row.try_get::<_, Option<String>>(0).map_err(|e| classify(&e))?;
        let max = row.try_get::<_, Option<String>>(1).map_err(|e| classify(&e))?;
        Ok((min, max))
    }
}

fn to_sql_param(value: &Value) -> Box<dyn ToSql + Sync + Send> {
    match value {
        Value::Text(s) => Box::new(s.clone()),
        Value::Integer(i) => Box::new(*i),
        Value::Decimal(d) => Box::new(*d),
        Value::Date(d) => Box::new(*d),
        Value::Boolean(b) => Box::new(*b),
    }
}

fn to_raw_row(row: &Row) -> Result<RawRow, BackendError> {
    let mut raw = RawRow::new();
    for (i, col) in row.columns().iter().enumerate() {
        let value = extract_value(row, i, col.type_()).map_err(|e| {
            BackendError::Query(format!(
                "cannot decode column {} of type {}: {}",
                col.name(),
                col.type_(),
                e
            ))
        })?;
        raw.push(col.name(), value);
    }
    Ok(raw)
}

/// Map a driver error to a backend error, keeping the SQLSTATE detail for logs.
fn classify(err: &tokio_postgres::Error) -> BackendError {
    if let Some(db_err) = err.as_db_error() {
        let code = db_err.code().code();
        let category = categorize_sqlstate(code);
        let message = format!("{} [{}]: {}", category, code, db_err.message());
        return match category {
            ErrorCategory::Connection => BackendError::Connection(message),
            _ => BackendError::Query(message),
        };
    }
    // Non-database error (connection, protocol, etc.)
    match err.source() {
        Some(source) if err.is_closed() || source.is::<std::io::Error>() => {
            BackendError::Connection(format!("{}: {}", err, source))
        }
        _ => BackendError::Query(err.to_string()),
    }
}

/// Categorize a SQLSTATE code into an ErrorCategory.
fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    match &code[..2] {
        // Class 42: Syntax Error or Access Rule Violation
        "42" => {
            if code == "42601" || code == "42000" {
                ErrorCategory::Syntax
            } else {
                // 42P01 = undefined_table, 42703 = undefined_column, etc.
                ErrorCategory::Semantic
            }
        }
        // Data exception, integrity violation, resources, limits, state, intervention
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}

/// Decode one cell. A type the driver cannot convert is an error, never NULL.
fn extract_value(
    row: &Row,
    idx: usize,
    pg_type: &Type,
) -> Result<CellValue, tokio_postgres::Error> {
    fn get<'a, T, F>(row: &'a Row, idx: usize, wrap: F) -> Result<CellValue, tokio_postgres::Error>
    where
        T: tokio_postgres::types::FromSql<'a>,
        F: FnOnce(T) -> CellValue,
    {
        let value = row.try_get::<_, Option<T>>(idx)?;
        Ok(value.map(wrap).unwrap_or(CellValue::Null))
    }

    match *pg_type {
        Type::BOOL => get(row, idx, CellValue::Bool),
        Type::INT2 => get(row, idx, CellValue::Int16),
        Type::INT4 => get(row, idx, CellValue::Int32),
        Type::INT8 => get(row, idx, CellValue::Int64),
        Type::FLOAT4 => get(row, idx, CellValue::Float32),
        Type::FLOAT8 => get(row, idx, CellValue::Float64),
        Type::TEXT | Type::VARCHAR | Type::NAME | Type::CHAR | Type::BPCHAR => {
            get(row, idx, CellValue::Text)
        }
        Type::DATE => get::<NaiveDate, _>(row, idx, CellValue::Date),
        Type::TIME => get::<NaiveTime, _>(row, idx, CellValue::Time),
        Type::TIMESTAMP => get::<NaiveDateTime, _>(row, idx, CellValue::DateTime),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>, _>(row, idx, CellValue::TimestampTz),
        Type::JSON | Type::JSONB => get(row, idx, CellValue::Json),
        // Projections are cast to the types above; anything else must be text-like.
        _ => get(row, idx, CellValue::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::SslMode;
    use crate::model::{compile, ExecutableQuery};
    use crate::testing::sample_snapshot;

    #[test]
    fn test_categorize_sqlstate() {
        assert_eq!(categorize_sqlstate("42601"), ErrorCategory::Syntax);
        assert_eq!(categorize_sqlstate("42P01"), ErrorCategory::Semantic);
        assert_eq!(categorize_sqlstate("23505"), ErrorCategory::Execution);
        assert_eq!(categorize_sqlstate("57014"), ErrorCategory::Execution);
        assert_eq!(categorize_sqlstate("40001"), ErrorCategory::Transaction);
        assert_eq!(categorize_sqlstate("08006"), ErrorCategory::Connection);
        assert_eq!(categorize_sqlstate("X"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Semantic.to_string(), "Semantic Error");
        assert_eq!(ErrorCategory::Unknown.to_string(), "Error");
    }

    #[test]
    fn test_sql_params_follow_value_types() {
        let params: Vec<Box<dyn ToSql + Sync + Send>> = [
            Value::Text("a".into()),
            Value::Integer(1),
            Value::Boolean(true),
        ]
        .iter()
        .map(to_sql_param)
        .collect();
        assert_eq!(params.len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_backend_error() {
        let config = ConnectionConfig {
            host: String::from("127.0.0.1"),
            port: 1,
            ssl_mode: SslMode::Disable,
            ..Default::default()
        };
        let store = PostgresStore::connect(&config).unwrap();
        let snapshot = sample_snapshot();
        let query = compile(&snapshot, ExecutableQuery::new("Customer")).unwrap();
        let result = store.execute(&query, Duration::from_secs(2)).await;
        assert!(matches!(
            result,
            Err(BackendError::Connection(_)) | Err(BackendError::Timeout(_))
        ));
    }
}

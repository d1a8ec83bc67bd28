use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::value::RawRow;
use crate::error::{BackendError, ExecutionError};
use crate::model::{CompiledQuery, ProjectedColumn};

/// Slack on top of the store's own deadline, so a store that honours it can
/// cancel server-side before the outer deadline drops its future.
const DEADLINE_GRACE: Duration = Duration::from_millis(250);

/// Textual (min, max) of a column, as reported by the store.
pub type RangeProbe = (Option<String>, Option<String>);

/// The opaque storage collaborator that runs compiled queries.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Run `query` and return its rows in store order. Implementations should
    /// give up after `timeout`.
    async fn execute(
        &self,
        query: &CompiledQuery,
        timeout: Duration,
    ) -> Result<Vec<RawRow>, BackendError>;

    /// Smallest and largest value of `column` in `table`.
    async fn probe_range(
        &self,
        table: &str,
        column: &ProjectedColumn,
        timeout: Duration,
    ) -> Result<RangeProbe, BackendError>;
}

/// Runs store calls under a deadline and folds every failure into
/// [`ExecutionError`], logging the detail instead of returning it.
#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn BackingStore>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn BackingStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    fn outer_deadline(&self) -> Duration {
        self.timeout + DEADLINE_GRACE
    }

    pub async fn execute(&self, query: &CompiledQuery) -> Result<Vec<RawRow>, ExecutionError> {
        let start = Instant::now();
        // The outer deadline also covers stores that ignore the one they are given.
        let call = self.store.execute(query, self.timeout);
        let outcome = tokio::time::timeout(self.outer_deadline(), call).await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(rows)) => {
                tracing::debug!(
                    store = self.store.name(),
                    table = %query.table,
                    rows = rows.len(),
                    ?elapsed,
                    "query executed"
                );
                Ok(rows)
            }
            Ok(Err(err)) => {
                tracing::error!(
                    store = self.store.name(),
                    table = %query.table,
                    error = %err,
                    ?elapsed,
                    "query failed"
                );
                Err(ExecutionError)
            }
            Err(_) => {
                tracing::error!(
                    store = self.store.name(),
                    table = %query.table,
                    timeout = ?self.timeout,
                    "query timed out"
                );
                Err(ExecutionError)
            }
        }
    }

    pub async fn probe_range(
        &self,
        table: &str,
        column: &ProjectedColumn,
    ) -> Result<RangeProbe, ExecutionError> {
        let probe = self.store.probe_range(table, column, self.timeout);
        match tokio::time::timeout(self.outer_deadline(), probe).await {
            Ok(Ok(bounds)) => Ok(bounds),
            Ok(Err(err)) => {
                tracing::error!(
                    store = self.store.name(),
                    table,
                    column = %column.name,
                    error = %err,
                    "range probe failed"
                );
                Err(ExecutionError)
            }
            Err(_) => {
                tracing::error!(
                    store = self.store.name(),
                    table,
                    column = %column.name,
                    "range probe timed out"
                );
                Err(ExecutionError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::model::{compile, ExecutableQuery};
    use crate::testing::{sample_snapshot, sample_store};

    #[test]
    fn test_outer_deadline_leaves_room_for_store_cancel() {
        let executor = QueryExecutor::new(Arc::new(MemoryStore::new()), Duration::from_secs(2));
        assert!(executor.outer_deadline() > Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_store_ignoring_deadline_is_cut_off() {
        let store = sample_store().with_delay(Duration::from_secs(30));
        let executor = QueryExecutor::new(Arc::new(store), Duration::from_millis(10));
        let query = compile(&sample_snapshot(), ExecutableQuery::new("Order")).unwrap();

        let start = Instant::now();
        assert!(executor.execute(&query).await.is_err());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}

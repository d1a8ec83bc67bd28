/// Caller-facing operations.
///
/// Each operation captures one snapshot and runs the whole request against
/// it. Failures are converted here, once: validation problems go back
/// structured, everything else is logged under a correlation id and replaced
/// by an [`ErrorEnvelope`](crate::error::ErrorEnvelope).
use std::sync::Arc;

use crate::context::ContextCache;
use crate::db::QueryExecutor;
use crate::error::{ErrorIds, QueryModelError, Result, ServiceError};
use crate::model::{
    compile, shape, to_inline_sql, ExecutableQuery, PossibleValuesView, ProjectedColumn,
    QueryResultsView, SemanticType, Snapshot, Value,
};

pub struct QueryModelService {
    cache: Arc<ContextCache>,
    executor: QueryExecutor,
    error_ids: ErrorIds,
}

impl QueryModelService {
    pub fn new(cache: Arc<ContextCache>, executor: QueryExecutor) -> Self {
        Self {
            cache,
            executor,
            error_ids: ErrorIds::default(),
        }
    }

    pub fn find_keyword(&self) -> Result<String, ServiceError> {
        self.boundary(self.snapshot().map(|s| s.find_keyword().to_string()))
    }

    pub fn entity_names(&self) -> Result<Vec<String>, ServiceError> {
        self.boundary(self.snapshot().map(|s| owned(s.registry().entity_names())))
    }

    pub fn attribute_names(&self, entity: &str) -> Result<Vec<String>, ServiceError> {
        let names: Result<Vec<String>> = self.snapshot().and_then(|snapshot| {
            let entity = snapshot.registry().resolve_entity(entity)?;
            Ok(entity
                .attributes
                .iter()
                .map(|a| a.display_name.clone())
                .collect())
        });
        self.boundary(names)
    }

    pub fn operator_names(
        &self,
        entity: &str,
        attribute: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let names: Result<Vec<String>> = self.snapshot().and_then(|snapshot| {
            let registry = snapshot.registry();
            let entity = registry.resolve_entity(entity)?;
            let attribute = registry.resolve_attribute(entity, attribute)?;
            Ok(snapshot
                .catalog()
                .applicable_operators(attribute)
                .into_iter()
                .map(|o| o.display_name.clone())
                .collect())
        });
        self.boundary(names)
    }

    /// Value-input shape for an attribute/operator pair. Range bounds missing
    /// from configuration are probed from the backing store.
    pub async fn possible_values(
        &self,
        entity: &str,
        attribute: &str,
        operator: &str,
    ) -> Result<PossibleValuesView, ServiceError> {
        let outcome = self.resolve_possible_values(entity, attribute, operator).await;
        self.boundary(outcome)
    }

    async fn resolve_possible_values(
        &self,
        entity: &str,
        attribute: &str,
        operator: &str,
    ) -> Result<PossibleValuesView> {
        let snapshot = self.snapshot()?;
        let registry = snapshot.registry();
        let entity = registry.resolve_entity(entity)?;
        let attribute = registry.resolve_attribute(entity, attribute)?;
        let view = snapshot.catalog().possible_values(attribute, operator)?;

        let (min, max) = match view {
            PossibleValuesView::Range { min, max } if min.is_none() || max.is_none() => (min, max),
            complete => return Ok(complete),
        };

        let column = ProjectedColumn {
            name: attribute.internal_name.clone(),
            semantic_type: attribute.semantic_type,
        };
        let (low, high) = self.executor.probe_range(&entity.internal_name, &column).await?;
        Ok(PossibleValuesView::Range {
            min: min.or_else(|| probed_bound(attribute.semantic_type, low.as_deref())),
            max: max.or_else(|| probed_bound(attribute.semantic_type, high.as_deref())),
        })
    }

    /// Separator display names, AND first.
    pub fn separator_names(&self) -> Result<Vec<String>, ServiceError> {
        self.boundary(self.snapshot().map(|s| owned(s.separator_names())))
    }

    pub async fn execute_query(
        &self,
        query: ExecutableQuery,
    ) -> Result<QueryResultsView, ServiceError> {
        let outcome = self.run(query).await;
        self.boundary(outcome)
    }

    async fn run(&self, query: ExecutableQuery) -> Result<QueryResultsView> {
        let snapshot = self.snapshot()?;
        let compiled = compile(&snapshot, query)?;
        tracing::debug!(
            entity = %compiled.entity,
            version = compiled.snapshot_version,
            conditions = compiled.predicate.leaf_count(),
            "compiled query"
        );
        let rows = self.executor.execute(&compiled).await?;
        Ok(shape(&snapshot, &compiled, rows)?)
    }

    /// Literal-inlined SQL for `query`, for diagnostics.
    pub fn compile_query(&self, query: ExecutableQuery) -> Result<String, ServiceError> {
        let sql: Result<String> = self
            .snapshot()
            .and_then(|snapshot| Ok(to_inline_sql(&compile(&snapshot, query)?)));
        self.boundary(sql)
    }

    /// Rebuild the snapshot from the configuration source. Configuration
    /// problems are returned as-is so the operator can fix them.
    pub fn reload_context(&self) -> Result<(), ServiceError> {
        match self.cache.reload() {
            Ok(snapshot) => {
                tracing::info!(version = snapshot.version(), "query model reloaded");
                Ok(())
            }
            Err(err) => Err(ServiceError::Configuration(err)),
        }
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>> {
        Ok(self.cache.get_or_build()?)
    }

    fn boundary<T>(&self, outcome: Result<T>) -> Result<T, ServiceError> {
        outcome.map_err(|err| match err {
            QueryModelError::Validation(invalid) => ServiceError::Invalid(invalid),
            other => ServiceError::Failure(self.error_ids.envelope(&other)),
        })
    }
}

fn owned(names: Vec<&str>) -> Vec<String> {
    names.into_iter().map(String::from).collect()
}

fn probed_bound(ty: SemanticType, raw: Option<&str>) -> Option<Value> {
    let raw = raw?;
    let value = Value::parse(ty, raw);
    if value.is_none() {
        tracing::warn!(raw, semantic_type = %ty, "ignoring unparseable probed bound");
    }
    value
}

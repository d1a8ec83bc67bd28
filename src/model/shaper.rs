use anyhow::{anyhow, bail, Result};
use serde::Serialize;

use super::compiler::CompiledQuery;
use super::snapshot::Snapshot;
use crate::db::{CellValue, RawRow};

/// Caller-facing result set: attribute display names and rows in store order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultsView {
    pub entity: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryResultsView {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, display_name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == display_name)
    }
}

/// Map raw rows back to display names through the snapshot `query` was
/// compiled against. Rows keep their order; nothing is sorted or merged.
pub fn shape(
    snapshot: &Snapshot,
    query: &CompiledQuery,
    rows: Vec<RawRow>,
) -> Result<QueryResultsView> {
    if query.snapshot_version != snapshot.version() {
        bail!(
            "query compiled against snapshot v{} shaped with v{}",
            query.snapshot_version,
            snapshot.version()
        );
    }

    let registry = snapshot.registry();
    let entity = registry
        .resolve_entity(&query.entity)
        .map_err(|e| anyhow!("shaping {}: {}", query.entity, e))?;

    let mut columns = Vec::with_capacity(query.columns.len());
    for column in &query.columns {
        let attribute = registry
            .attribute_for_column(entity, &column.name)
            .ok_or_else(|| anyhow!("column {} of {} has no attribute", column.name, query.table))?;
        columns.push(attribute.display_name.clone());
    }

    let mut shaped = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some((unknown, _)) = row
            .iter()
            .find(|(name, _)| registry.attribute_for_column(entity, name).is_none())
        {
            bail!("store returned column {} unknown to {}", unknown, query.table);
        }
        shaped.push(
            query
                .columns
                .iter()
                .map(|column| row.get(&column.name).cloned().unwrap_or(CellValue::Null))
                .collect(),
        );
    }

    Ok(QueryResultsView {
        entity: entity.display_name.clone(),
        columns,
        rows: shaped,
    })
}

/// Query model: metadata snapshot and the request pipeline over it.
///
/// ```text
/// model.toml (ConfigSource)
///       ↓
/// AliasRegistry + OperatorCatalog   (registry.rs, catalog.rs)
///       ↓
/// Snapshot, versioned & immutable   (snapshot.rs)
///       ↓
/// ExecutableQuery → CompiledQuery   (compiler.rs)
///       ↓
/// SQL rendering                     (sql.rs)
///       ↓
/// Backing store                     (db/ module)
///       ↓
/// QueryResultsView                  (shaper.rs)
/// ```
pub mod catalog;
pub mod compiler;
pub mod registry;
pub mod shaper;
pub mod snapshot;
pub mod sql;
pub mod types;

pub use catalog::OperatorCatalog;
pub use compiler::{compile, Comparison, CompiledQuery, Predicate, ProjectedColumn};
pub use registry::AliasRegistry;
pub use shaper::{shape, QueryResultsView};
pub use snapshot::Snapshot;
pub use sql::{range_probe, to_inline_sql, to_statement, SqlStatement};
pub use types::*;

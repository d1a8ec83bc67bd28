/// ExecutableQuery → CompiledQuery compiler.
///
/// Resolves every display name against one snapshot, checks operator
/// applicability, arity and value types, then folds the flat condition list
/// into a predicate tree. Compilation never touches the backing store.
///
/// Separators are applied strictly left to right with no precedence between
/// AND and OR: `c0 AND c1 OR c2` is `(c0 AND c1) OR c2`.
use super::snapshot::Snapshot;
use super::types::{
    AttributeDescriptor, ConditionNode, ExecutableQuery, OperatorDescriptor, OperatorKind,
    SemanticType, Separator, Value,
};
use crate::error::{ValidationError, ValidationErrorKind};

/// Backend-ready query: target table, projection and predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Entity display name, kept for shaping and logs.
    pub entity: String,
    pub table: String,
    pub columns: Vec<ProjectedColumn>,
    pub predicate: Predicate,
    /// Version of the snapshot this query was compiled against.
    pub snapshot_version: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    pub name: String,
    pub semantic_type: SemanticType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row; produced by an empty condition list.
    Always,
    Compare(Comparison),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub column: String,
    pub semantic_type: SemanticType,
    pub operator: OperatorKind,
    pub values: Vec<Value>,
}

impl Predicate {
    fn join(self, separator: Separator, right: Predicate) -> Predicate {
        match separator {
            Separator::And => Predicate::And(Box::new(self), Box::new(right)),
            Separator::Or => Predicate::Or(Box::new(self), Box::new(right)),
        }
    }

    /// Number of comparison leaves.
    pub fn leaf_count(&self) -> usize {
        match self {
            Predicate::Always => 0,
            Predicate::Compare(_) => 1,
            Predicate::And(l, r) | Predicate::Or(l, r) => l.leaf_count() + r.leaf_count(),
        }
    }
}

/// Compile `query` against `snapshot`.
pub fn compile(
    snapshot: &Snapshot,
    query: ExecutableQuery,
) -> Result<CompiledQuery, ValidationError> {
    let registry = snapshot.registry();
    let entity = registry.resolve_entity(&query.entity)?;

    let last = query.conditions.len().saturating_sub(1);
    let mut predicate: Option<Predicate> = None;
    let mut pending: Option<Separator> = None;

    for (index, condition) in query.conditions.iter().enumerate() {
        let attribute = registry
            .resolve_attribute(entity, &condition.attribute)
            .map_err(|e| tag(index, e))?;
        let operator = snapshot
            .catalog()
            .resolve_for(attribute, &condition.operator)
            .map_err(|e| tag(index, e))?;
        let values = typed_values(attribute, operator, condition)
            .map_err(|kind| ValidationError::at(index, kind))?;

        let leaf = Predicate::Compare(Comparison {
            column: attribute.internal_name.clone(),
            semantic_type: attribute.semantic_type,
            operator: operator.kind,
            values,
        });

        predicate = Some(match (predicate, pending) {
            (Some(left), Some(separator)) => left.join(separator, leaf),
            _ => leaf,
        });

        pending = if index < last {
            Some(separator_for(snapshot, index, condition)?)
        } else {
            None
        };
    }

    Ok(CompiledQuery {
        entity: entity.display_name.clone(),
        table: entity.internal_name.clone(),
        columns: entity
            .attributes
            .iter()
            .map(|a| ProjectedColumn {
                name: a.internal_name.clone(),
                semantic_type: a.semantic_type,
            })
            .collect(),
        predicate: predicate.unwrap_or(Predicate::Always),
        snapshot_version: snapshot.version(),
    })
}

fn tag(index: usize, err: ValidationError) -> ValidationError {
    ValidationError::at(index, err.kind)
}

fn separator_for(
    snapshot: &Snapshot,
    index: usize,
    condition: &ConditionNode,
) -> Result<Separator, ValidationError> {
    let alias = condition
        .separator
        .as_deref()
        .ok_or_else(|| ValidationError::at(index, ValidationErrorKind::MissingSeparator))?;
    snapshot.resolve_separator(alias).ok_or_else(|| {
        ValidationError::at(
            index,
            ValidationErrorKind::UnknownSeparator {
                separator: alias.to_string(),
            },
        )
    })
}

fn typed_values(
    attribute: &AttributeDescriptor,
    operator: &OperatorDescriptor,
    condition: &ConditionNode,
) -> Result<Vec<Value>, ValidationErrorKind> {
    if !operator.arity.accepts(condition.values.len()) {
        return Err(ValidationErrorKind::ArityMismatch {
            operator: operator.display_name.clone(),
            expected: operator.arity,
            actual: condition.values.len(),
        });
    }

    condition
        .values
        .iter()
        .map(|raw| {
            if let Some(domain) = &attribute.domain {
                if !domain.iter().any(|v| v == raw) {
                    return Err(ValidationErrorKind::ValueOutsideDomain {
                        attribute: attribute.display_name.clone(),
                        value: raw.clone(),
                    });
                }
            }
            Value::parse(attribute.semantic_type, raw).ok_or_else(|| {
                ValidationErrorKind::InvalidValue {
                    value: raw.clone(),
                    expected: attribute.semantic_type,
                }
            })
        })
        .collect()
}

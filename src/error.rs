/// Error taxonomy for the query model pipeline.
///
/// Typed errors flow through each stage as `Result`s. The service boundary
/// converts everything that is not a caller mistake into an opaque
/// [`ErrorEnvelope`] carrying a correlation id.
use crate::model::{Arity, SemanticType};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Malformed or ambiguous metadata detected while building a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The configuration source could not be read or parsed.
    #[error("failed to load query model configuration: {0}")]
    Load(String),
    /// The configuration parsed, but failed validation.
    #[error("invalid query model configuration ({} issue(s)): {}", .0.len(), .0.join("; "))]
    Invalid(Vec<String>),
}

impl ConfigurationError {
    pub fn issues(&self) -> Vec<String> {
        match self {
            ConfigurationError::Load(message) => vec![message.clone()],
            ConfigurationError::Invalid(issues) => issues.clone(),
        }
    }
}

/// A submitted request that does not fit the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// Index of the offending condition, when the error comes from a query.
    pub condition: Option<usize>,
    pub kind: ValidationErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum ValidationErrorKind {
    #[error("unknown entity `{entity}`")]
    UnknownEntity { entity: String },
    #[error("unknown attribute `{attribute}` for entity `{entity}`")]
    UnknownAttribute { entity: String, attribute: String },
    #[error("unknown operator `{operator}`")]
    UnknownOperator { operator: String },
    #[error("operator `{operator}` is not applicable to {semantic_type} attribute `{attribute}`")]
    OperatorNotApplicable {
        operator: String,
        attribute: String,
        semantic_type: SemanticType,
    },
    #[error("operator `{operator}` expects {expected}, got {actual}")]
    ArityMismatch {
        operator: String,
        expected: Arity,
        actual: usize,
    },
    #[error("value `{value}` is not a valid {expected}")]
    InvalidValue {
        value: String,
        expected: SemanticType,
    },
    #[error("value `{value}` is not one of the values of `{attribute}`")]
    ValueOutsideDomain { attribute: String, value: String },
    #[error("unknown separator `{separator}`")]
    UnknownSeparator { separator: String },
    #[error("missing separator before the next condition")]
    MissingSeparator,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind) -> Self {
        Self {
            condition: None,
            kind,
        }
    }

    pub fn at(condition: usize, kind: ValidationErrorKind) -> Self {
        Self {
            condition: Some(condition),
            kind,
        }
    }

    pub fn unknown_entity(entity: &str) -> Self {
        Self::new(ValidationErrorKind::UnknownEntity {
            entity: entity.to_string(),
        })
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.condition {
            Some(index) => write!(f, "condition {}: {}", index, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Backing-store failure as reported by a store implementation. Carries
/// backend detail and must never be shown to callers.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
}

/// The single caller-visible execution failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("query execution failed")]
pub struct ExecutionError;

/// Every failure a pipeline stage can produce.
#[derive(Debug, Error)]
pub enum QueryModelError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = QueryModelError> = std::result::Result<T, E>;

/// Opaque failure returned across the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub id: u64,
    pub message: String,
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// What the boundary hands back to its caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// A correctable request error.
    #[error(transparent)]
    Invalid(ValidationError),
    /// Configuration problems, only surfaced to the operator requesting a reload.
    #[error(transparent)]
    Configuration(ConfigurationError),
    #[error("{0}")]
    Failure(ErrorEnvelope),
}

// Don't start at zero; the id shouldn't hint at how many failures happened.
const FIRST_ERROR_ID: u64 = 456_782;

/// Monotonic correlation id source for opaque failures.
#[derive(Debug)]
pub struct ErrorIds {
    next: AtomicU64,
}

impl Default for ErrorIds {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(FIRST_ERROR_ID),
        }
    }
}

impl ErrorIds {
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Log `detail` under a fresh id and build the generic envelope for it.
    pub fn envelope(&self, detail: &dyn fmt::Display) -> ErrorEnvelope {
        let id = self.next_id();
        tracing::error!(error_id = id, "{}", detail);
        ErrorEnvelope {
            id,
            message: format!(
                "An internal server error occurred. The error id is {}. Please contact the maintenance team and provide them this number for reference.",
                id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_with_index() {
        let err = ValidationError::at(
            2,
            ValidationErrorKind::UnknownOperator {
                operator: "near".into(),
            },
        );
        assert_eq!(err.to_string(), "condition 2: unknown operator `near`");
        assert_eq!(
            ValidationError::unknown_entity("Ghost").to_string(),
            "unknown entity `Ghost`"
        );
    }

    #[test]
    fn test_configuration_error_lists_issues() {
        let err = ConfigurationError::Invalid(vec!["a".into(), "b".into()]);
        assert_eq!(
            err.to_string(),
            "invalid query model configuration (2 issue(s)): a; b"
        );
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn test_error_ids_are_monotonic() {
        let ids = ErrorIds::default();
        let first = ids.next_id();
        let second = ids.next_id();
        assert_eq!(first, FIRST_ERROR_ID);
        assert_eq!(second, first + 1);
    }

    #[test]
    fn test_envelope_hides_detail() {
        let ids = ErrorIds::default();
        let envelope = ids.envelope(&"relation \"customers\" does not exist");
        assert!(!envelope.message.contains("customers"));
        assert!(envelope.message.contains(&envelope.id.to_string()));
    }

    #[test]
    fn test_validation_error_serializes_structured() {
        let err = ValidationError::at(
            0,
            ValidationErrorKind::ArityMismatch {
                operator: "between".into(),
                expected: Arity::Two,
                actual: 1,
            },
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["condition"], 0);
        assert_eq!(json["kind"]["reason"], "arityMismatch");
        assert_eq!(json["kind"]["expected"], "two");
    }
}

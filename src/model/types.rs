//! Descriptor and request types shared by every stage of the query model.
//!
//! Descriptors (`EntityDescriptor`, `AttributeDescriptor`,
//! `OperatorDescriptor`) are built once per snapshot and never mutated.
//! Request types (`ExecutableQuery`, `ConditionNode`) are transient: they are
//! deserialized per request and consumed by the compiler.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date literal format accepted in conditions and configuration.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Semantic type of an attribute. Drives operator applicability and value parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    String,
    Integer,
    Decimal,
    Date,
    Boolean,
    Enumerated,
}

impl SemanticType {
    /// Types whose values have a natural order (numeric and date).
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            SemanticType::Integer | SemanticType::Decimal | SemanticType::Date
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SemanticType::String => "string",
            SemanticType::Integer => "integer",
            SemanticType::Decimal => "decimal",
            SemanticType::Date => "date",
            SemanticType::Boolean => "boolean",
            SemanticType::Enumerated => "enumerated",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Number of literal values an operator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arity {
    Zero,
    One,
    Two,
    /// One or more values.
    Many,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Zero => count == 0,
            Arity::One => count == 1,
            Arity::Two => count == 2,
            Arity::Many => count >= 1,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Zero => write!(f, "no values"),
            Arity::One => write!(f, "exactly one value"),
            Arity::Two => write!(f, "exactly two values"),
            Arity::Many => write!(f, "at least one value"),
        }
    }
}

/// Symbolic operator kind, independent of its display alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperatorKind {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Between,
    In,
    IsNull,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 11] = [
        OperatorKind::Equals,
        OperatorKind::NotEquals,
        OperatorKind::Contains,
        OperatorKind::StartsWith,
        OperatorKind::GreaterThan,
        OperatorKind::GreaterOrEqual,
        OperatorKind::LessThan,
        OperatorKind::LessOrEqual,
        OperatorKind::Between,
        OperatorKind::In,
        OperatorKind::IsNull,
    ];

    pub fn arity(self) -> Arity {
        match self {
            OperatorKind::IsNull => Arity::Zero,
            OperatorKind::Between => Arity::Two,
            OperatorKind::In => Arity::Many,
            _ => Arity::One,
        }
    }

    /// Stable key used for this kind in configuration files.
    pub fn key(self) -> &'static str {
        match self {
            OperatorKind::Equals => "equals",
            OperatorKind::NotEquals => "notEquals",
            OperatorKind::Contains => "contains",
            OperatorKind::StartsWith => "startsWith",
            OperatorKind::GreaterThan => "greaterThan",
            OperatorKind::GreaterOrEqual => "greaterOrEqual",
            OperatorKind::LessThan => "lessThan",
            OperatorKind::LessOrEqual => "lessOrEqual",
            OperatorKind::Between => "between",
            OperatorKind::In => "in",
            OperatorKind::IsNull => "isNull",
        }
    }

    pub fn from_key(key: &str) -> Option<OperatorKind> {
        OperatorKind::ALL.into_iter().find(|kind| kind.key() == key)
    }

    pub fn default_alias(self) -> &'static str {
        match self {
            OperatorKind::Equals => "equals",
            OperatorKind::NotEquals => "not equals",
            OperatorKind::Contains => "contains",
            OperatorKind::StartsWith => "starts with",
            OperatorKind::GreaterThan => "greater than",
            OperatorKind::GreaterOrEqual => "greater or equal",
            OperatorKind::LessThan => "less than",
            OperatorKind::LessOrEqual => "less or equal",
            OperatorKind::Between => "between",
            OperatorKind::In => "in",
            OperatorKind::IsNull => "is null",
        }
    }

    /// Operators offered a bounded range of values. The inclusive
    /// comparisons take free text.
    pub fn is_range(self) -> bool {
        matches!(
            self,
            OperatorKind::Between | OperatorKind::GreaterThan | OperatorKind::LessThan
        )
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_alias())
    }
}

/// Logical separator joining a condition to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    And,
    Or,
}

impl Separator {
    pub const ALL: [Separator; 2] = [Separator::And, Separator::Or];

    pub fn keyword(self) -> &'static str {
        match self {
            Separator::And => "AND",
            Separator::Or => "OR",
        }
    }
}

/// A typed literal value, parsed from the caller's text according to the
/// attribute's semantic type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Date(NaiveDate),
    Boolean(bool),
}

impl Value {
    /// Parse `raw` as a value of `ty`. Returns `None` when the text does not
    /// parse. Enumerated values are not checked against their domain here.
    pub fn parse(ty: SemanticType, raw: &str) -> Option<Value> {
        match ty {
            SemanticType::String | SemanticType::Enumerated => Some(Value::Text(raw.to_string())),
            SemanticType::Integer => raw.trim().parse::<i64>().ok().map(Value::Integer),
            SemanticType::Decimal => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite())
                .map(Value::Decimal),
            SemanticType::Date => NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
                .ok()
                .map(Value::Date),
            SemanticType::Boolean => {
                let trimmed = raw.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Some(Value::Boolean(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Some(Value::Boolean(false))
                } else {
                    None
                }
            }
        }
    }

    /// Ordering between two values of the same variant.
    pub fn partial_cmp_same(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Inclusive bounds configured (or probed) for an ordered attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeBounds {
    pub min: Option<Value>,
    pub max: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub display_name: String,
    pub internal_name: String,
    pub semantic_type: SemanticType,
    /// Finite value domain, only present for enumerated attributes.
    pub domain: Option<Vec<String>>,
    pub range: RangeBounds,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    pub display_name: String,
    pub internal_name: String,
    pub attributes: Vec<AttributeDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDescriptor {
    pub display_name: String,
    pub kind: OperatorKind,
    pub arity: Arity,
    pub applies_to: Vec<SemanticType>,
}

/// One filter condition as submitted by the caller, by display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionNode {
    pub attribute: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
    /// Separator alias joining this condition to the next one.
    #[serde(default)]
    pub separator: Option<String>,
}

impl ConditionNode {
    pub fn new(attribute: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: operator.into(),
            values: Vec::new(),
            separator: None,
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn then(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableQuery {
    pub entity: String,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
}

impl ExecutableQuery {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            conditions: Vec::new(),
        }
    }

    pub fn condition(mut self, condition: ConditionNode) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// Expected value-input shape for an attribute/operator pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PossibleValuesView {
    Enumerated { values: Vec<String> },
    Range { min: Option<Value>, max: Option<Value> },
    FreeText,
}

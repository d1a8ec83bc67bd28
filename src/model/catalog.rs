/// Operator applicability and value-shape rules.
use std::collections::HashMap;

use super::types::{
    Arity, AttributeDescriptor, OperatorDescriptor, OperatorKind, PossibleValuesView,
    SemanticType,
};
use crate::config::QueryModelConfig;
use crate::error::{ConfigurationError, ValidationError, ValidationErrorKind};

const STRING_OPERATORS: &[OperatorKind] = &[
    OperatorKind::Equals,
    OperatorKind::NotEquals,
    OperatorKind::Contains,
    OperatorKind::StartsWith,
];

const ORDERED_OPERATORS: &[OperatorKind] = &[
    OperatorKind::Equals,
    OperatorKind::NotEquals,
    OperatorKind::GreaterThan,
    OperatorKind::GreaterOrEqual,
    OperatorKind::LessThan,
    OperatorKind::LessOrEqual,
    OperatorKind::Between,
];

const ENUMERATED_OPERATORS: &[OperatorKind] = &[OperatorKind::Equals, OperatorKind::In];

const BOOLEAN_OPERATORS: &[OperatorKind] = &[OperatorKind::Equals];

const ALL_TYPES: [SemanticType; 6] = [
    SemanticType::String,
    SemanticType::Integer,
    SemanticType::Decimal,
    SemanticType::Date,
    SemanticType::Boolean,
    SemanticType::Enumerated,
];

/// Operators offered for a semantic type, in display order.
/// `IsNull` is not listed; it depends on the attribute being nullable.
pub fn type_operators(ty: SemanticType) -> &'static [OperatorKind] {
    match ty {
        SemanticType::String => STRING_OPERATORS,
        SemanticType::Integer | SemanticType::Decimal | SemanticType::Date => ORDERED_OPERATORS,
        SemanticType::Enumerated => ENUMERATED_OPERATORS,
        SemanticType::Boolean => BOOLEAN_OPERATORS,
    }
}

/// Immutable operator table for one snapshot.
#[derive(Debug, Clone)]
pub struct OperatorCatalog {
    operators: Vec<OperatorDescriptor>,
    by_name: HashMap<String, usize>,
}

impl Default for OperatorCatalog {
    fn default() -> Self {
        Self::build_collecting(&QueryModelConfig::default(), &mut Vec::new())
    }
}

impl OperatorCatalog {
    pub fn build(config: &QueryModelConfig) -> Result<Self, ConfigurationError> {
        let mut issues = Vec::new();
        let catalog = Self::build_collecting(config, &mut issues);
        if issues.is_empty() {
            Ok(catalog)
        } else {
            Err(ConfigurationError::Invalid(issues))
        }
    }

    pub(crate) fn build_collecting(config: &QueryModelConfig, issues: &mut Vec<String>) -> Self {
        for key in config.operators.keys() {
            if OperatorKind::from_key(key).is_none() {
                issues.push(format!("unknown operator `{}` in [operators]", key));
            }
        }

        let mut operators: Vec<OperatorDescriptor> = Vec::with_capacity(OperatorKind::ALL.len());
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for kind in OperatorKind::ALL {
            let display_name = config
                .operators
                .get(kind.key())
                .map(|alias| alias.trim().to_string())
                .unwrap_or_else(|| kind.default_alias().to_string());

            if display_name.is_empty() {
                issues.push(format!("operator `{}` has an empty alias", kind.key()));
            } else if let Some(&existing) = by_name.get(&display_name) {
                issues.push(format!(
                    "operators `{}` and `{}` share the alias `{}`",
                    operators[existing].kind.key(),
                    kind.key(),
                    display_name
                ));
            } else {
                by_name.insert(display_name.clone(), operators.len());
            }

            let applies_to = ALL_TYPES
                .into_iter()
                .filter(|ty| kind == OperatorKind::IsNull || type_operators(*ty).contains(&kind))
                .collect();

            operators.push(OperatorDescriptor {
                display_name,
                kind,
                arity: kind.arity(),
                applies_to,
            });
        }

        Self { operators, by_name }
    }

    pub fn operators(&self) -> &[OperatorDescriptor] {
        &self.operators
    }

    pub fn descriptor(&self, kind: OperatorKind) -> &OperatorDescriptor {
        // Built with one descriptor per kind, in `OperatorKind::ALL` order.
        &self.operators[kind as usize]
    }

    pub fn resolve(&self, display_name: &str) -> Result<&OperatorDescriptor, ValidationError> {
        self.by_name
            .get(display_name)
            .map(|&i| &self.operators[i])
            .ok_or_else(|| {
                ValidationError::new(ValidationErrorKind::UnknownOperator {
                    operator: display_name.to_string(),
                })
            })
    }

    /// Operators usable with `attribute`, in fixed display order.
    pub fn applicable_operators(
        &self,
        attribute: &AttributeDescriptor,
    ) -> Vec<&OperatorDescriptor> {
        let mut applicable: Vec<&OperatorDescriptor> = type_operators(attribute.semantic_type)
            .iter()
            .map(|&kind| self.descriptor(kind))
            .collect();
        if attribute.nullable {
            applicable.push(self.descriptor(OperatorKind::IsNull));
        }
        applicable
    }

    pub fn is_applicable(&self, attribute: &AttributeDescriptor, kind: OperatorKind) -> bool {
        (kind == OperatorKind::IsNull && attribute.nullable)
            || type_operators(attribute.semantic_type).contains(&kind)
    }

    /// Resolve `display_name` and check it applies to `attribute`.
    pub fn resolve_for(
        &self,
        attribute: &AttributeDescriptor,
        display_name: &str,
    ) -> Result<&OperatorDescriptor, ValidationError> {
        let operator = self.resolve(display_name)?;
        if !self.is_applicable(attribute, operator.kind) {
            return Err(ValidationError::new(
                ValidationErrorKind::OperatorNotApplicable {
                    operator: display_name.to_string(),
                    attribute: attribute.display_name.clone(),
                    semantic_type: attribute.semantic_type,
                },
            ));
        }
        Ok(operator)
    }

    /// Value-input shape for `attribute` combined with `operator`.
    ///
    /// Range bounds come from configuration; missing bounds are left as
    /// `None` for the caller to fill from the backing store.
    pub fn possible_values(
        &self,
        attribute: &AttributeDescriptor,
        operator: &str,
    ) -> Result<PossibleValuesView, ValidationError> {
        let operator = self.resolve_for(attribute, operator)?;

        if operator.arity == Arity::Zero {
            return Ok(PossibleValuesView::FreeText);
        }
        if let Some(domain) = &attribute.domain {
            return Ok(PossibleValuesView::Enumerated {
                values: domain.clone(),
            });
        }
        if attribute.semantic_type.is_ordered() && operator.kind.is_range() {
            return Ok(PossibleValuesView::Range {
                min: attribute.range.min.clone(),
                max: attribute.range.max.clone(),
            });
        }
        Ok(PossibleValuesView::FreeText)
    }
}

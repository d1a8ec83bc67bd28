/// Display-name registry for entities and attributes.
///
/// Built once from configuration. Every problem found while building is
/// collected so a single failed load reports all of them.
use std::collections::{HashMap, HashSet};

use super::types::{AttributeDescriptor, EntityDescriptor, RangeBounds, SemanticType, Value};
use crate::config::{scalar_text, AttributeConfig, EntityConfig, QueryModelConfig};
use crate::error::{ConfigurationError, ValidationError, ValidationErrorKind};

#[derive(Debug, Clone, Default)]
struct EntityIndex {
    attributes: HashMap<String, usize>,
    columns: HashMap<String, usize>,
}

/// Immutable mapping from display names to schema identifiers.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    entities: Vec<EntityDescriptor>,
    by_name: HashMap<String, usize>,
    indexes: Vec<EntityIndex>,
}

impl AliasRegistry {
    pub fn build(config: &QueryModelConfig) -> Result<Self, ConfigurationError> {
        let mut issues = Vec::new();
        let registry = Self::build_collecting(config, &mut issues);
        if issues.is_empty() {
            Ok(registry)
        } else {
            Err(ConfigurationError::Invalid(issues))
        }
    }

    /// Build the registry, appending every problem found to `issues`.
    pub(crate) fn build_collecting(config: &QueryModelConfig, issues: &mut Vec<String>) -> Self {
        let mut registry = AliasRegistry::default();

        for (position, entity_config) in config.entities.iter().enumerate() {
            let entity = build_entity(position, entity_config, issues);

            if entity.display_name.is_empty() {
                continue;
            }
            if registry.by_name.contains_key(&entity.display_name) {
                issues.push(format!(
                    "duplicate entity name `{}`",
                    entity.display_name
                ));
                continue;
            }

            let mut index = EntityIndex::default();
            for (i, attribute) in entity.attributes.iter().enumerate() {
                index.attributes.insert(attribute.display_name.clone(), i);
                index.columns.insert(attribute.internal_name.clone(), i);
            }

            registry
                .by_name
                .insert(entity.display_name.clone(), registry.entities.len());
            registry.entities.push(entity);
            registry.indexes.push(index);
        }

        registry
    }

    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    /// Entity display names, in configuration order.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities
            .iter()
            .map(|e| e.display_name.as_str())
            .collect()
    }

    pub fn resolve_entity(&self, display_name: &str) -> Result<&EntityDescriptor, ValidationError> {
        self.by_name
            .get(display_name)
            .map(|&i| &self.entities[i])
            .ok_or_else(|| ValidationError::unknown_entity(display_name))
    }

    pub fn resolve_attribute<'a>(
        &'a self,
        entity: &'a EntityDescriptor,
        display_name: &str,
    ) -> Result<&'a AttributeDescriptor, ValidationError> {
        self.index_of(entity)
            .and_then(|index| index.attributes.get(display_name))
            .map(|&i| &entity.attributes[i])
            .ok_or_else(|| {
                ValidationError::new(ValidationErrorKind::UnknownAttribute {
                    entity: entity.display_name.clone(),
                    attribute: display_name.to_string(),
                })
            })
    }

    /// Reverse lookup from a backing column to its attribute.
    pub fn attribute_for_column<'a>(
        &'a self,
        entity: &'a EntityDescriptor,
        column: &str,
    ) -> Option<&'a AttributeDescriptor> {
        self.index_of(entity)
            .and_then(|index| index.columns.get(column))
            .map(|&i| &entity.attributes[i])
    }

    fn index_of(&self, entity: &EntityDescriptor) -> Option<&EntityIndex> {
        self.by_name
            .get(&entity.display_name)
            .map(|&i| &self.indexes[i])
    }
}

fn build_entity(
    position: usize,
    config: &EntityConfig,
    issues: &mut Vec<String>,
) -> EntityDescriptor {
    let name = config.name.trim();
    let label = if name.is_empty() {
        issues.push(format!("entity #{} has an empty name", position + 1));
        format!("#{}", position + 1)
    } else {
        name.to_string()
    };

    if !is_table_name(&config.table) {
        issues.push(format!(
            "entity `{}`: table `{}` is not a valid identifier",
            label, config.table
        ));
    }
    if config.attributes.is_empty() {
        issues.push(format!("entity `{}` has no attributes", label));
    }

    let mut attributes = Vec::with_capacity(config.attributes.len());
    let mut seen_names = HashSet::new();
    let mut seen_columns = HashSet::new();

    for attribute_config in &config.attributes {
        let attribute = build_attribute(&label, attribute_config, issues);
        if attribute.display_name.is_empty() {
            continue;
        }
        if !seen_names.insert(attribute.display_name.clone()) {
            issues.push(format!(
                "entity `{}`: duplicate attribute name `{}`",
                label, attribute.display_name
            ));
            continue;
        }
        if !seen_columns.insert(attribute.internal_name.clone()) {
            issues.push(format!(
                "entity `{}`: column `{}` is mapped by more than one attribute",
                label, attribute.internal_name
            ));
            continue;
        }
        attributes.push(attribute);
    }

    EntityDescriptor {
        display_name: name.to_string(),
        internal_name: config.table.clone(),
        attributes,
    }
}

fn build_attribute(
    entity: &str,
    config: &AttributeConfig,
    issues: &mut Vec<String>,
) -> AttributeDescriptor {
    let name = config.name.trim();
    if name.is_empty() {
        issues.push(format!(
            "entity `{}`: attribute for column `{}` has an empty name",
            entity, config.column
        ));
    }
    let label = format!("{}.{}", entity, name);

    if !is_identifier(&config.column) {
        issues.push(format!(
            "attribute `{}`: column `{}` is not a valid identifier",
            label, config.column
        ));
    }

    let domain = match (config.semantic_type, &config.values) {
        (SemanticType::Enumerated, Some(values)) => {
            check_domain(&label, values, issues);
            Some(values.clone())
        }
        (SemanticType::Enumerated, None) => {
            issues.push(format!(
                "attribute `{}` is enumerated but declares no values",
                label
            ));
            None
        }
        (_, Some(_)) => {
            issues.push(format!(
                "attribute `{}`: only enumerated attributes can declare values",
                label
            ));
            None
        }
        (_, None) => None,
    };

    let range = build_range(&label, config, issues);

    AttributeDescriptor {
        display_name: name.to_string(),
        internal_name: config.column.clone(),
        semantic_type: config.semantic_type,
        domain,
        range,
        nullable: config.nullable,
    }
}

fn check_domain(label: &str, values: &[String], issues: &mut Vec<String>) {
    if values.is_empty() {
        issues.push(format!("attribute `{}` declares an empty value list", label));
    }
    let mut seen = HashSet::new();
    for value in values {
        if value.is_empty() {
            issues.push(format!("attribute `{}` declares an empty value", label));
        } else if !seen.insert(value.as_str()) {
            issues.push(format!(
                "attribute `{}` declares value `{}` more than once",
                label, value
            ));
        }
    }
}

fn build_range(label: &str, config: &AttributeConfig, issues: &mut Vec<String>) -> RangeBounds {
    if config.min.is_none() && config.max.is_none() {
        return RangeBounds::default();
    }
    if !config.semantic_type.is_ordered() {
        issues.push(format!(
            "attribute `{}`: min/max are only allowed on numeric and date attributes",
            label
        ));
        return RangeBounds::default();
    }

    let mut bound = |which: &str, raw: &Option<toml::Value>| -> Option<Value> {
        let raw = raw.as_ref()?;
        let text = scalar_text(raw).unwrap_or_else(|| raw.to_string());
        let parsed = Value::parse(config.semantic_type, &text);
        if parsed.is_none() {
            issues.push(format!(
                "attribute `{}`: {} `{}` is not a valid {}",
                label, which, text, config.semantic_type
            ));
        }
        parsed
    };
    let min = bound("min", &config.min);
    let max = bound("max", &config.max);

    if let (Some(lo), Some(hi)) = (&min, &max) {
        if lo.partial_cmp_same(hi) == Some(std::cmp::Ordering::Greater) {
            issues.push(format!(
                "attribute `{}`: min {} is greater than max {}",
                label, lo, hi
            ));
        }
    }

    RangeBounds { min, max }
}

/// Plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Table name, optionally qualified with a schema: `schema.table`.
fn is_table_name(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() <= 2 && parts.iter().all(|p| is_identifier(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_config;

    fn attribute(name: &str, column: &str, ty: SemanticType) -> AttributeConfig {
        AttributeConfig {
            name: name.into(),
            column: column.into(),
            semantic_type: ty,
            values: None,
            min: None,
            max: None,
            nullable: false,
        }
    }

    fn entity(name: &str, table: &str, attributes: Vec<AttributeConfig>) -> EntityConfig {
        EntityConfig {
            name: name.into(),
            table: table.into(),
            attributes,
        }
    }

    #[test]
    fn test_build_sample_registry() {
        let registry = AliasRegistry::build(&sample_config()).unwrap();
        assert_eq!(registry.entity_names(), vec!["Customer", "Order"]);

        let customer = registry.resolve_entity("Customer").unwrap();
        assert_eq!(customer.internal_name, "customers");
        let city = registry.resolve_attribute(customer, "City").unwrap();
        assert_eq!(city.internal_name, "city");
        assert_eq!(city.semantic_type, SemanticType::String);

        let age = registry.resolve_attribute(customer, "Age").unwrap();
        assert_eq!(age.range.min, Some(Value::Integer(18)));
        assert_eq!(age.range.max, Some(Value::Integer(99)));
    }

    #[test]
    fn test_unknown_names_are_validation_errors() {
        let registry = AliasRegistry::build(&sample_config()).unwrap();
        let err = registry.resolve_entity("Supplier").unwrap_err();
        assert_eq!(err, ValidationError::unknown_entity("Supplier"));

        let customer = registry.resolve_entity("Customer").unwrap();
        let err = registry.resolve_attribute(customer, "Shoe size").unwrap_err();
        assert!(matches!(
            err.kind,
            ValidationErrorKind::UnknownAttribute { .. }
        ));
        assert_eq!(err.condition, None);
    }

    #[test]
    fn test_reverse_column_lookup() {
        let registry = AliasRegistry::build(&sample_config()).unwrap();
        let customer = registry.resolve_entity("Customer").unwrap();
        let joined = registry.attribute_for_column(customer, "joined_on").unwrap();
        assert_eq!(joined.display_name, "Joined");
        assert!(registry.attribute_for_column(customer, "ssn").is_none());
    }

    #[test]
    fn test_all_collisions_reported_in_one_pass() {
        let config = QueryModelConfig {
            entities: vec![
                entity(
                    "Customer",
                    "customers",
                    vec![
                        attribute("City", "city", SemanticType::String),
                        attribute("City", "town", SemanticType::String),
                    ],
                ),
                entity(
                    "Customer",
                    "clients",
                    vec![attribute("Name", "name", SemanticType::String)],
                ),
                entity(
                    "Product",
                    "products",
                    vec![
                        attribute("Sku", "sku", SemanticType::String),
                        attribute("Code", "sku", SemanticType::String),
                    ],
                ),
            ],
            ..Default::default()
        };

        let err = AliasRegistry::build(&config).unwrap_err();
        let issues = err.issues();
        assert_eq!(issues.len(), 3, "{:?}", issues);
        assert!(issues.iter().any(|i| i.contains("duplicate attribute name `City`")));
        assert!(issues.iter().any(|i| i.contains("duplicate entity name `Customer`")));
        assert!(issues.iter().any(|i| i.contains("column `sku`")));
    }

    #[test]
    fn test_malformed_attributes() {
        let mut tier = attribute("Tier", "tier", SemanticType::Enumerated);
        tier.values = Some(vec!["gold".into(), "gold".into()]);
        let mut status = attribute("Status", "status", SemanticType::Enumerated);
        status.values = None;
        let mut name = attribute("Name", "name", SemanticType::String);
        name.values = Some(vec!["a".into()]);
        let mut age = attribute("Age", "age", SemanticType::Integer);
        age.min = Some(toml::Value::Integer(90));
        age.max = Some(toml::Value::Integer(10));
        let mut city = attribute("City", "city", SemanticType::String);
        city.min = Some(toml::Value::String("a".into()));
        let mut born = attribute("Born", "born", SemanticType::Date);
        born.min = Some(toml::Value::String("yesterday".into()));
        let bad_column = attribute("Email", "email; drop table", SemanticType::String);

        let config = QueryModelConfig {
            entities: vec![
                entity(
                    "Customer",
                    "public.customers",
                    vec![tier, status, name, age, city, born, bad_column],
                ),
                entity("Empty", "empty", vec![]),
                entity("  ", "x", vec![attribute("A", "a", SemanticType::Boolean)]),
            ],
            ..Default::default()
        };

        let issues = AliasRegistry::build(&config).unwrap_err().issues();
        let expect = [
            "value `gold` more than once",
            "enumerated but declares no values",
            "only enumerated attributes can declare values",
            "min 90 is greater than max 10",
            "only allowed on numeric and date attributes",
            "min `yesterday` is not a valid date",
            "column `email; drop table` is not a valid identifier",
            "entity `Empty` has no attributes",
            "entity #3 has an empty name",
        ];
        for needle in expect {
            assert!(
                issues.iter().any(|i| i.contains(needle)),
                "missing {:?} in {:?}",
                needle,
                issues
            );
        }
        assert_eq!(issues.len(), expect.len(), "{:?}", issues);
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("joined_on"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
        assert!(is_table_name("sales.orders"));
        assert!(!is_table_name("a.b.c"));
        assert!(!is_table_name("orders;"));
    }
}
